//! Built-in vendor normalizers.

pub mod cisco_ios;
pub mod cisco_nxos;
