pub mod address;
pub mod cache;
pub mod export_view_key;
pub mod info;
pub mod keygen;
pub mod prepare;
pub mod scan;
pub mod sign_withdraw;
