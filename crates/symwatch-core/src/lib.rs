pub mod event;
pub mod pdk;
