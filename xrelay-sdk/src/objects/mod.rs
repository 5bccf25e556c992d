pub mod address;
pub mod deposit;
pub mod report;
pub mod signing;

pub use address::AddressFormat;
pub use deposit::{DepositEvent, RawDeposit};
pub use report::{ReportPayload, ReportStatus};
pub use signing::{PayloadHash, SigningRequest};
