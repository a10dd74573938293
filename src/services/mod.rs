pub mod accounts;
pub mod loans;
pub mod notifications;
pub mod transfers;
