#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use procam_calib as calib;

#[doc(inline)]
pub use procam_io as io;
