pub mod encoder;
pub mod screen;

pub use encoder::SixelImage;
pub use screen::SixelScreen;
