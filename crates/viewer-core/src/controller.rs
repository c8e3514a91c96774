//! Pointer, wheel and menu input turned into note and view changes.
//!
//! The controller never blocks on a dialog. When it needs user input it moves
//! into a prompt step and returns a [`Prompt`]; the caller answers through
//! [`InteractionController::answer`]. Note creation runs
//! `AwaitingAlias -> AwaitingText -> commit`; showing a note runs
//! `ShowingNote -> AwaitingEdit -> commit`. A cancelled or empty answer ends
//! the flow without mutation.
//!
//! Marker drag and pan are independent sub-states bound to different buttons.
//! In edit mode a primary press on a marker arms a drag. Releasing after motion
//! moves the note to the dropped position through
//! [`NoteStore::reposition_note`]; releasing without motion opens the note.

use crate::compositor::{layout_markers, pick_marker, Frame, Marker};
use crate::session::{DocumentSession, SessionError};
use crate::viewport::{ViewPoint, Viewport};
use doc_model::{NoteGateway, NoteKey, NoteStore, StoreError};
use log::{debug, info};
use pdf_engine::PdfEngine;
use std::path::PathBuf;

const ADD_TITLE: &str = "Add note";
const ALIAS_MESSAGE: &str = "Enter an alias for this point:";
const TEXT_MESSAGE: &str = "Enter the note for this point:";
const SHOW_TITLE: &str = "Note";
const EDIT_TITLE: &str = "Edit note";
const EDIT_MESSAGE: &str = "Enter the new note:";

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Edit,
    View,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Middle,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub control: bool,
    pub shift: bool,
}

impl Modifiers {
    pub const CONTROL: Modifiers = Modifiers { control: true, shift: false };
}

#[derive(Debug, Clone, PartialEq)]
pub enum PointerEvent {
    /// `target` is the marker the surface picked under the pointer, if any.
    Press { button: PointerButton, position: ViewPoint, target: Option<NoteKey> },
    Motion { position: ViewPoint },
    Release { button: PointerButton, position: ViewPoint },
    /// Positive `delta` scrolls away from the user.
    Wheel { delta: f64, modifiers: Modifiers },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    OpenFiles(Vec<PathBuf>),
    SwitchFile(String),
    SaveNotes,
    ReloadNotes,
    NextPage,
    PreviousPage,
    ZoomIn,
    ZoomOut,
    SetMode(Mode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    Text { title: &'static str, message: String, initial: Option<String> },
    Confirm { title: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Text(String),
    Yes,
    No,
    Cancelled,
}

/// What the caller must do after an input: redraw, ask the user, or both.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reaction {
    pub redraw: bool,
    pub prompt: Option<Prompt>,
}

impl Reaction {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn redraw() -> Self {
        Self { redraw: true, prompt: None }
    }

    fn ask(prompt: Prompt) -> Self {
        Self { redraw: false, prompt: Some(prompt) }
    }

    fn redraw_if(changed: bool) -> Self {
        Self { redraw: changed, prompt: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStep {
    AwaitingAlias,
    AwaitingText,
    ShowingNote,
    AwaitingEdit,
}

#[derive(Debug, Clone, PartialEq)]
enum PromptState {
    Idle,
    AwaitingAlias { anchor: NoteKey },
    AwaitingText { anchor: NoteKey, alias: String },
    ShowingNote { key: NoteKey },
    AwaitingEdit { key: NoteKey },
}

#[derive(Debug, Clone, PartialEq)]
struct DragSession {
    key: NoteKey,
    last: ViewPoint,
    offset: (f64, f64),
    moved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PanSession {
    last: ViewPoint,
}

pub struct InteractionController<E, G> {
    session: DocumentSession<E>,
    store: NoteStore<G>,
    viewport: Viewport,
    mode: Mode,
    prompt: PromptState,
    drag: Option<DragSession>,
    pan: Option<PanSession>,
}

impl<E: PdfEngine, G: NoteGateway> InteractionController<E, G> {
    pub fn new(session: DocumentSession<E>, store: NoteStore<G>) -> Self {
        Self {
            session,
            store,
            viewport: Viewport::default(),
            mode: Mode::default(),
            prompt: PromptState::Idle,
            drag: None,
            pan: None,
        }
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn session(&self) -> &DocumentSession<E> {
        &self.session
    }

    pub fn store(&self) -> &NoteStore<G> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut NoteStore<G> {
        &mut self.store
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn prompt_step(&self) -> Option<PromptStep> {
        match self.prompt {
            PromptState::Idle => None,
            PromptState::AwaitingAlias { .. } => Some(PromptStep::AwaitingAlias),
            PromptState::AwaitingText { .. } => Some(PromptStep::AwaitingText),
            PromptState::ShowingNote { .. } => Some(PromptStep::ShowingNote),
            PromptState::AwaitingEdit { .. } => Some(PromptStep::AwaitingEdit),
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn is_panning(&self) -> bool {
        self.pan.is_some()
    }

    /// Markers for the active page, with any in-progress drag applied.
    pub fn markers(&self) -> Vec<Marker> {
        let (Some(file), Some(page)) = (self.session.current_file(), self.session.current_page())
        else {
            return Vec::new();
        };

        let mut markers = layout_markers(self.store.notes_for(file, page), &self.viewport);
        if let Some(drag) = &self.drag {
            if let Some(marker) = markers.iter_mut().find(|marker| marker.key == drag.key) {
                marker.center = marker.center.offset(drag.offset.0, drag.offset.1);
            }
        }
        markers
    }

    /// Hit test against the current marker layout.
    pub fn marker_at(&self, position: ViewPoint) -> Option<NoteKey> {
        pick_marker(&self.markers(), position).map(|marker| marker.key.clone())
    }

    /// Renders the active page with its markers, or `None` with nothing loaded.
    pub fn frame(&self) -> Result<Option<Frame>, ControllerError> {
        let Some(page) = self.session.render_current(self.viewport.zoom())? else {
            return Ok(None);
        };
        Ok(Some(Frame { page, markers: self.markers() }))
    }

    pub fn handle_pointer(&mut self, event: PointerEvent) -> Result<Reaction, ControllerError> {
        match event {
            PointerEvent::Press { button: PointerButton::Primary, position, target } => {
                Ok(self.primary_press(position, target))
            }
            PointerEvent::Press { button: PointerButton::Middle, position, .. } => {
                self.pan = Some(PanSession { last: position });
                Ok(Reaction::none())
            }
            PointerEvent::Release { button: PointerButton::Primary, .. } => self.primary_release(),
            PointerEvent::Release { button: PointerButton::Middle, .. } => {
                self.pan = None;
                Ok(Reaction::none())
            }
            PointerEvent::Press { button: PointerButton::Secondary, .. }
            | PointerEvent::Release { button: PointerButton::Secondary, .. } => {
                Ok(Reaction::none())
            }
            PointerEvent::Motion { position } => Ok(self.motion(position)),
            PointerEvent::Wheel { delta, modifiers } => Ok(self.wheel(delta, modifiers)),
        }
    }

    fn primary_press(&mut self, position: ViewPoint, target: Option<NoteKey>) -> Reaction {
        if self.prompt != PromptState::Idle || self.drag.is_some() {
            return Reaction::none();
        }

        let (Some(file), Some(page)) = (self.session.current_file(), self.session.current_page())
        else {
            debug!("event=pointer_press module=controller status=skip reason=no_document");
            return Reaction::none();
        };

        match (target, self.mode) {
            (Some(key), Mode::Edit) => {
                if self.store.contains(&key) {
                    self.drag = Some(DragSession {
                        key,
                        last: position,
                        offset: (0.0, 0.0),
                        moved: false,
                    });
                }
                Reaction::none()
            }
            (Some(key), Mode::View) => self.show_note(key),
            (None, Mode::Edit) => {
                let anchor = NoteKey::new(file, page, self.viewport.to_doc(position));
                debug!("event=note_prompt module=controller status=start anchor={anchor}");
                self.prompt = PromptState::AwaitingAlias { anchor };
                Reaction::ask(Prompt::Text {
                    title: ADD_TITLE,
                    message: ALIAS_MESSAGE.to_owned(),
                    initial: None,
                })
            }
            (None, Mode::View) => Reaction::none(),
        }
    }

    fn primary_release(&mut self) -> Result<Reaction, ControllerError> {
        let Some(drag) = self.drag.take() else {
            return Ok(Reaction::none());
        };

        if !drag.moved {
            return Ok(self.show_note(drag.key));
        }

        if self.mode != Mode::Edit {
            return Ok(Reaction::redraw());
        }

        let dropped = self
            .viewport
            .to_view(drag.key.point())
            .offset(drag.offset.0, drag.offset.1);
        let target = self.viewport.to_doc(dropped);

        match self.store.reposition_note(&drag.key, target)? {
            Some(moved) => info!("event=marker_drop module=controller status=ok key={moved}"),
            None => debug!("event=marker_drop module=controller status=skip key={}", drag.key),
        }
        Ok(Reaction::redraw())
    }

    fn motion(&mut self, position: ViewPoint) -> Reaction {
        let mut redraw = false;

        if let Some(drag) = self.drag.as_mut() {
            let (dx, dy) = position.delta_from(drag.last);
            if dx != 0.0 || dy != 0.0 {
                drag.offset = (drag.offset.0 + dx, drag.offset.1 + dy);
                drag.last = position;
                drag.moved = true;
                redraw = true;
            }
        }

        if let Some(pan) = self.pan.as_mut() {
            let (dx, dy) = position.delta_from(pan.last);
            self.viewport.pan_by(dx, dy);
            pan.last = position;
            redraw = true;
        }

        Reaction::redraw_if(redraw)
    }

    fn wheel(&mut self, delta: f64, modifiers: Modifiers) -> Reaction {
        if !modifiers.control {
            return Reaction::none();
        }

        if delta > 0.0 {
            self.viewport.zoom_in();
        } else if delta < 0.0 {
            self.viewport.zoom_out();
        } else {
            return Reaction::none();
        }
        Reaction::redraw()
    }

    fn show_note(&mut self, key: NoteKey) -> Reaction {
        let Some(note) = self.store.note(&key) else {
            debug!("event=note_show module=controller status=skip reason=unknown_key key={key}");
            return Reaction::none();
        };

        let message = format!("Alias: {}\nNote: {}\n\nEdit this note?", note.alias, note.text);
        self.prompt = PromptState::ShowingNote { key };
        Reaction::ask(Prompt::Confirm { title: SHOW_TITLE, message })
    }

    /// Feeds the user's answer to the pending prompt.
    pub fn answer(&mut self, answer: Answer) -> Result<Reaction, ControllerError> {
        let state = std::mem::replace(&mut self.prompt, PromptState::Idle);

        match (state, answer) {
            (PromptState::AwaitingAlias { anchor }, Answer::Text(alias)) if !alias.is_empty() => {
                self.prompt = PromptState::AwaitingText { anchor, alias };
                Ok(Reaction::ask(Prompt::Text {
                    title: ADD_TITLE,
                    message: TEXT_MESSAGE.to_owned(),
                    initial: None,
                }))
            }
            (PromptState::AwaitingText { anchor, alias }, Answer::Text(text))
                if !text.is_empty() =>
            {
                let created = self.store.create_note(anchor, alias, text)?;
                Ok(Reaction::redraw_if(created))
            }
            (PromptState::ShowingNote { key }, Answer::Yes) => {
                let Some(note) = self.store.note(&key) else {
                    return Ok(Reaction::redraw());
                };
                let initial = Some(note.text.clone());
                self.prompt = PromptState::AwaitingEdit { key };
                Ok(Reaction::ask(Prompt::Text {
                    title: EDIT_TITLE,
                    message: EDIT_MESSAGE.to_owned(),
                    initial,
                }))
            }
            (PromptState::ShowingNote { .. }, _) => Ok(Reaction::redraw()),
            (PromptState::AwaitingEdit { key }, Answer::Text(text)) if !text.is_empty() => {
                self.store.update_note_text(&key, text)?;
                Ok(Reaction::redraw())
            }
            (PromptState::AwaitingEdit { .. }, _) => Ok(Reaction::redraw()),
            (PromptState::Idle, _) => Ok(Reaction::none()),
            (state, _) => {
                debug!("event=note_prompt module=controller status=cancelled step={state:?}");
                Ok(Reaction::none())
            }
        }
    }

    pub fn execute(&mut self, command: Command) -> Result<Reaction, ControllerError> {
        match command {
            Command::OpenFiles(paths) => {
                if paths.is_empty() {
                    return Ok(Reaction::none());
                }
                self.reset_interaction();
                self.session.load_files(&paths)?;
                self.store.reload_all()?;
                Ok(Reaction::redraw())
            }
            Command::SwitchFile(name) => {
                self.reset_interaction();
                self.session.switch_file(&name)?;
                Ok(Reaction::redraw())
            }
            Command::SaveNotes => {
                self.store.save_all()?;
                Ok(Reaction::none())
            }
            Command::ReloadNotes => {
                self.store.reload_all()?;
                Ok(Reaction::redraw())
            }
            Command::NextPage => {
                let changed = self.session.next_page();
                if changed {
                    self.drag = None;
                }
                Ok(Reaction::redraw_if(changed))
            }
            Command::PreviousPage => {
                let changed = self.session.previous_page();
                if changed {
                    self.drag = None;
                }
                Ok(Reaction::redraw_if(changed))
            }
            Command::ZoomIn => {
                self.viewport.zoom_in();
                Ok(Reaction::redraw())
            }
            Command::ZoomOut => {
                self.viewport.zoom_out();
                Ok(Reaction::redraw())
            }
            Command::SetMode(mode) => {
                self.mode = mode;
                Ok(Reaction::none())
            }
        }
    }

    fn reset_interaction(&mut self) {
        self.prompt = PromptState::Idle;
        self.drag = None;
        self.pan = None;
    }
}
