//! Interactive annotation engine.
//!
//! - [`viewport`]: document space to view space under zoom, plus surface scroll.
//! - [`session`]: loaded files, active file and page.
//! - [`controller`]: the input state machine over the session and note store.
//! - [`compositor`]: marker layout, hit targets and raster composition.
//! - [`dialogs`]: dialog collaborator and the prompt-answering driver.

pub mod compositor;
pub mod controller;
pub mod dialogs;
pub mod session;
pub mod viewport;

pub use compositor::{Frame, Marker, RasterCompositor, RenderCompositor};
pub use controller::{
    Answer, Command, ControllerError, InteractionController, Mode, Modifiers, PointerButton,
    PointerEvent, Prompt, PromptStep, Reaction,
};
pub use dialogs::{Choice, Dialogs, ScriptedDialogs};
pub use session::{DocumentSession, LoadedFile, SessionError};
pub use viewport::{ViewPoint, Viewport};
