pub mod headless_presenter;
pub mod window_presenter;
