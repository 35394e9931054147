//! Shop Service - Invoices, payments and party balances for multi-tenant shops.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod startup;
