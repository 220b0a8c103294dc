pub mod buffer;
pub mod capture;
pub mod decode;
pub mod device;
pub mod input;
pub mod replay;
