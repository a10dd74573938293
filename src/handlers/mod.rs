pub mod accounts;
pub mod auth;
pub mod health;
pub mod loans;
pub mod transactions;
pub mod transfers;
