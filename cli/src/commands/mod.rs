pub mod info;
pub mod patch;
pub mod verify;
