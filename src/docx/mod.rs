pub mod html;
pub mod package;
pub mod templating;
pub mod text;
pub mod xml;
