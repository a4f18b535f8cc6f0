//! 块设备抽象
//!
//! 提供只读块设备接口和字节级读取。

mod device;
mod io;

pub use device::{BlockDevice, BlockDev};
