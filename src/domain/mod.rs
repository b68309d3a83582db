mod counter;
mod event;
mod integrity;

pub use counter::*;
pub use event::*;
pub use integrity::*;
