//! Domain models for shop-service.

mod context;
mod invoice;
mod line_item;
mod party;
mod payment;
mod purchase;

pub use context::RequestContext;
pub use invoice::{
    CustomerDetails, CustomerView, HeaderWrite, InvoiceAggregate, InvoicePayload, InvoiceRow,
    InvoiceRowSet, InvoiceStatus, InvoiceSummary, InvoiceSummaryRow, InvoiceType, InvoiceWrite,
    ListInvoicesFilter, PhotoRow, PhotoView, SnapshotRow, TotalsRow, TotalsView,
};
pub use line_item::{ItemInput, ItemRow, ItemView};
pub use party::{NewParty, PartyRow, PartyType, PartyView};
pub use payment::{
    AllocationInput, AllocationRow, AllocationView, Direction, PaymentPayload, PaymentRow,
    PaymentView,
};
pub use purchase::{PurchasePayload, PurchaseRow, PurchaseView};
