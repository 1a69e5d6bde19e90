pub mod application;
pub mod theme;

pub use application::Application;
pub use theme::get_current_style;
