//! Dialog collaborator and the synchronous driver that answers prompts with it.

use crate::controller::{
    Answer, Command, ControllerError, InteractionController, PointerEvent, Prompt, Reaction,
};
use doc_model::NoteGateway;
use log::warn;
use pdf_engine::PdfEngine;
use std::collections::VecDeque;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Yes,
    No,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileFilter {
    pub label: &'static str,
    pub extensions: &'static [&'static str],
}

pub const PDF_FILTER: FileFilter = FileFilter { label: "PDF files", extensions: &["pdf"] };

/// Modal dialogs. Every call blocks until the user responds.
pub trait Dialogs {
    /// `None` when the dialog is dismissed.
    fn ask_string(&mut self, title: &str, message: &str, initial: Option<&str>) -> Option<String>;
    fn ask_yes_no_cancel(&mut self, title: &str, message: &str) -> Choice;
    /// Empty when the picker is dismissed.
    fn choose_files(&mut self, filter: &FileFilter) -> Vec<PathBuf>;
    fn show_error(&mut self, message: &str);
}

fn ask<D: Dialogs + ?Sized>(dialogs: &mut D, prompt: &Prompt) -> Answer {
    match prompt {
        Prompt::Text { title, message, initial } => {
            match dialogs.ask_string(title, message, initial.as_deref()) {
                Some(text) => Answer::Text(text),
                None => Answer::Cancelled,
            }
        }
        Prompt::Confirm { title, message } => match dialogs.ask_yes_no_cancel(title, message) {
            Choice::Yes => Answer::Yes,
            Choice::No => Answer::No,
            Choice::Cancelled => Answer::Cancelled,
        },
    }
}

/// Answers prompts until the controller settles. Errors go to
/// [`Dialogs::show_error`]. Returns whether a redraw is due.
fn settle<E, G, D>(
    controller: &mut InteractionController<E, G>,
    dialogs: &mut D,
    mut result: Result<Reaction, ControllerError>,
) -> bool
where
    E: PdfEngine,
    G: NoteGateway,
    D: Dialogs + ?Sized,
{
    let mut redraw = false;
    loop {
        match result {
            Ok(Reaction { redraw: again, prompt }) => {
                redraw |= again;
                let Some(prompt) = prompt else {
                    return redraw;
                };
                let answer = ask(dialogs, &prompt);
                result = controller.answer(answer);
            }
            Err(err) => {
                warn!("event=controller module=dialogs status=error error={err}");
                dialogs.show_error(&err.to_string());
                return true;
            }
        }
    }
}

pub fn dispatch_pointer<E, G, D>(
    controller: &mut InteractionController<E, G>,
    dialogs: &mut D,
    event: PointerEvent,
) -> bool
where
    E: PdfEngine,
    G: NoteGateway,
    D: Dialogs + ?Sized,
{
    let result = controller.handle_pointer(event);
    settle(controller, dialogs, result)
}

pub fn dispatch_command<E, G, D>(
    controller: &mut InteractionController<E, G>,
    dialogs: &mut D,
    command: Command,
) -> bool
where
    E: PdfEngine,
    G: NoteGateway,
    D: Dialogs + ?Sized,
{
    let result = controller.execute(command);
    settle(controller, dialogs, result)
}

/// "Load files" menu entry: pick PDFs, then open them.
pub fn open_with_picker<E, G, D>(
    controller: &mut InteractionController<E, G>,
    dialogs: &mut D,
) -> bool
where
    E: PdfEngine,
    G: NoteGateway,
    D: Dialogs + ?Sized,
{
    let paths = dialogs.choose_files(&PDF_FILTER);
    if paths.is_empty() {
        return false;
    }
    dispatch_command(controller, dialogs, Command::OpenFiles(paths))
}

/// Dialogs that replay queued answers. An empty queue dismisses the dialog.
#[derive(Debug, Default)]
pub struct ScriptedDialogs {
    strings: VecDeque<Option<String>>,
    choices: VecDeque<Choice>,
    files: VecDeque<Vec<PathBuf>>,
    asked: Vec<String>,
    errors: Vec<String>,
}

impl ScriptedDialogs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_string(mut self, text: impl Into<String>) -> Self {
        self.strings.push_back(Some(text.into()));
        self
    }

    pub fn with_dismissed_string(mut self) -> Self {
        self.strings.push_back(None);
        self
    }

    pub fn with_choice(mut self, choice: Choice) -> Self {
        self.choices.push_back(choice);
        self
    }

    pub fn with_files(mut self, files: Vec<PathBuf>) -> Self {
        self.files.push_back(files);
        self
    }

    /// Messages of every dialog shown, in order.
    pub fn asked(&self) -> &[String] {
        &self.asked
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

impl Dialogs for ScriptedDialogs {
    fn ask_string(&mut self, _title: &str, message: &str, initial: Option<&str>) -> Option<String> {
        match initial {
            Some(initial) => self.asked.push(format!("{message} [{initial}]")),
            None => self.asked.push(message.to_owned()),
        }
        self.strings.pop_front().flatten()
    }

    fn ask_yes_no_cancel(&mut self, _title: &str, message: &str) -> Choice {
        self.asked.push(message.to_owned());
        self.choices.pop_front().unwrap_or(Choice::Cancelled)
    }

    fn choose_files(&mut self, _filter: &FileFilter) -> Vec<PathBuf> {
        self.files.pop_front().unwrap_or_default()
    }

    fn show_error(&mut self, message: &str) {
        self.errors.push(message.to_owned());
    }
}
