pub mod invoices;

pub use invoices::{
    AddLineRequest, BillingAddressDto, CreateInvoiceRequest, InvoiceIdRequest,
    InvoiceLineResponse, InvoiceResponse, PatientResponse, UpdateInvoiceRequest,
};
