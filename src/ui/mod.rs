mod bridge;
mod hover;
mod renderer;
mod state;
mod theme;

pub use bridge::{PresentationBridge, UiMutation};
pub use hover::{Bounds, HoverGuard};
pub use renderer::{render, widget_rect};
pub use state::WidgetState;
