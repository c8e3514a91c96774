use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use doc_model::{DocPoint, NoteKey, NoteStore};
use log::info;
use pdf_engine::{default_engine, LopdfEngine, OpenSource, PdfEngine};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use storage::{Settings, SqliteNoteGateway, Storage};
use viewer_core::dialogs::dispatch_pointer;
use viewer_core::session::display_name;
use viewer_core::{
    Command, DocumentSession, InteractionController, Mode, PointerButton, PointerEvent,
    RasterCompositor, RenderCompositor, ScriptedDialogs, ViewPoint, Viewport,
};

pub mod logging;

type Controller = InteractionController<LopdfEngine, SqliteNoteGateway>;

#[derive(Debug, Parser)]
#[command(name = "pdf-notes")]
#[command(about = "Point notes on PDF pages")]
pub struct Cli {
    /// Note database, overriding the settings file.
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,
    /// Data directory holding settings.json and the default database.
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable PDF metadata and note counts.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Inspect and change stored notes.
    #[command(subcommand)]
    Notes(NotesCommand),
    /// Click a view point the way the viewer would, answering its prompts.
    Annotate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// View-space point, `X,Y`.
        #[arg(long, value_parser = parse_point)]
        at: (f64, f64),
        #[arg(long)]
        zoom: Option<f64>,
        #[arg(long)]
        alias: String,
        #[arg(long)]
        text: String,
    },
    /// Render a page with its note markers to PNG.
    Render {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        zoom: Option<f64>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Subcommand)]
enum NotesCommand {
    /// List notes, optionally for one file or page.
    List {
        #[arg(long)]
        file: Option<String>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        json: bool,
    },
    /// Add a note at a document-space point.
    Add {
        #[command(flatten)]
        at: NoteAt,
        #[arg(long)]
        alias: String,
        #[arg(long)]
        text: String,
    },
    /// Replace the text of an existing note.
    Edit {
        #[command(flatten)]
        at: NoteAt,
        #[arg(long)]
        text: String,
    },
}

#[derive(Debug, Args)]
struct NoteAt {
    #[arg(value_name = "FILE")]
    file: PathBuf,
    #[arg(long)]
    page: u32,
    #[arg(long)]
    x: f64,
    #[arg(long)]
    y: f64,
}

impl NoteAt {
    fn key(&self) -> Result<NoteKey> {
        let page = page_index(self.page)?;
        Ok(NoteKey::new(display_name(&self.file), page, DocPoint::new(self.x, self.y)))
    }
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    file_name: String,
    page_count: u32,
    first_page_size_pt: Option<PageSizeOutput>,
    notes_per_page: BTreeMap<u32, usize>,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
}

#[derive(Debug, Serialize)]
struct NoteOutput<'a> {
    file_name: &'a str,
    page: u32,
    x: f64,
    y: f64,
    alias: &'a str,
    text: &'a str,
}

/// Resolved data root and settings for one invocation.
struct Invocation {
    storage: Storage,
    settings: Settings,
}

impl Invocation {
    fn resolve(data_dir: Option<PathBuf>, db: Option<PathBuf>) -> Result<Self> {
        let storage = match data_dir {
            Some(root) => Storage::with_root(root),
            None => Storage::from_default_project().context("failed to resolve data directory")?,
        };
        let mut settings = storage.load_settings().context("failed to read settings")?;
        if let Some(db) = db {
            settings.database_file = db;
        }
        Ok(Self { storage, settings })
    }

    fn open_store(&self) -> Result<NoteStore<SqliteNoteGateway>> {
        let gateway = self.storage.open_notes(&self.settings).with_context(|| {
            format!(
                "failed to open note database {}",
                self.storage.database_path(&self.settings).display()
            )
        })?;
        let mut store = NoteStore::new(gateway);
        store.reload_all().context("failed to load notes")?;
        Ok(store)
    }

    fn zoom(&self, flag: Option<f64>) -> f64 {
        flag.unwrap_or(self.settings.initial_zoom)
    }

    fn controller(&self, file: &Path, page: u32, zoom: f64, mode: Mode) -> Result<Controller> {
        let store = self.open_store()?;
        let session = DocumentSession::new(default_engine());
        let mut controller = InteractionController::new(session, store)
            .with_viewport(Viewport::with_zoom(zoom))
            .with_mode(mode);

        controller
            .execute(Command::OpenFiles(vec![file.to_path_buf()]))
            .with_context(|| format!("failed to open PDF {}", file.display()))?;

        let page_count = controller.session().page_count().unwrap_or(0);
        if page >= page_count {
            anyhow::bail!("page {} is out of range, document has {page_count} pages", page + 1);
        }
        for _ in 0..page {
            controller.execute(Command::NextPage)?;
        }
        Ok(controller)
    }
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    if let Commands::Version = cli.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let invocation = Invocation::resolve(cli.data_dir, cli.db)?;
    let level = logging::resolve_level(
        cli.log_level.as_deref(),
        std::env::var(logging::LOG_ENV).ok(),
        &invocation.settings.log_level,
    );
    let _logger = logging::init(&level)?;

    match cli.command {
        Commands::Info { file } => run_info(&invocation, &file),
        Commands::Notes(command) => run_notes(&invocation, command),
        Commands::Annotate { file, page, at, zoom, alias, text } => {
            run_annotate(&invocation, &file, page, at, zoom, alias, text)
        }
        Commands::Render { file, page, zoom, output } => {
            run_render(&invocation, &file, page, zoom, output.as_deref())
        }
        Commands::Version => Ok(()),
    }
}

fn run_info(invocation: &Invocation, file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let mut engine = default_engine();
    let handle = engine.open(OpenSource::from(file)).context("failed to open PDF")?;

    let page_count = engine.page_count(handle)?;
    let first_page_size_pt = if page_count > 0 {
        let size = engine.page_size(handle, 0)?;
        Some(PageSizeOutput { width: size.width_pt, height: size.height_pt })
    } else {
        None
    };

    let file_name = display_name(file);
    let store = invocation.open_store()?;
    let mut notes_per_page = BTreeMap::new();
    for (key, _) in store.notes_for_file(&file_name) {
        *notes_per_page.entry(key.page + 1).or_insert(0) += 1;
    }

    let payload = InfoOutput {
        path: file.display().to_string(),
        file_name,
        page_count,
        first_page_size_pt,
        notes_per_page,
    };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    engine.close(handle)?;

    Ok(())
}

fn run_notes(invocation: &Invocation, command: NotesCommand) -> Result<()> {
    let mut store = invocation.open_store()?;

    match command {
        NotesCommand::List { file, page, json } => {
            let page = page.map(page_index).transpose()?;
            let files: Vec<String> = match file {
                Some(file) => vec![file],
                None => store.files().into_iter().map(str::to_owned).collect(),
            };

            let mut listed = Vec::new();
            for file in &files {
                for (key, note) in store.notes_for_file(file) {
                    if page.is_some_and(|page| page != key.page) {
                        continue;
                    }
                    let point = key.point();
                    listed.push(NoteOutput {
                        file_name: &key.file_name,
                        page: key.page + 1,
                        x: point.x,
                        y: point.y,
                        alias: &note.alias,
                        text: &note.text,
                    });
                }
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&listed)?);
            } else {
                for note in &listed {
                    println!(
                        "{}\tpage {}\t({}, {})\t{}\t{}",
                        note.file_name, note.page, note.x, note.y, note.alias, note.text
                    );
                }
            }
            Ok(())
        }
        NotesCommand::Add { at, alias, text } => {
            let key = at.key()?;
            if alias.is_empty() {
                anyhow::bail!("--alias must not be empty");
            }
            store.create_note(key.clone(), alias, text)?;
            println!("added {key}");
            Ok(())
        }
        NotesCommand::Edit { at, text } => {
            let key = at.key()?;
            if store.update_note_text(&key, text)? {
                println!("updated {key}");
            } else {
                println!("no such note");
            }
            Ok(())
        }
    }
}

fn run_annotate(
    invocation: &Invocation,
    file: &Path,
    page: u32,
    at: (f64, f64),
    zoom: Option<f64>,
    alias: String,
    text: String,
) -> Result<()> {
    ensure_pdf_exists(file)?;
    let page = page_index(page)?;
    let mut controller = invocation.controller(file, page, invocation.zoom(zoom), Mode::Edit)?;

    let position = ViewPoint::new(at.0, at.1);
    if let Some(existing) = controller.marker_at(position) {
        anyhow::bail!("view point ({}, {}) is on existing note {existing}", at.0, at.1);
    }

    let before = controller.store().len();
    let mut dialogs = ScriptedDialogs::new().with_string(alias).with_string(text);
    dispatch_pointer(
        &mut controller,
        &mut dialogs,
        PointerEvent::Press { button: PointerButton::Primary, position, target: None },
    );
    dispatch_pointer(
        &mut controller,
        &mut dialogs,
        PointerEvent::Release { button: PointerButton::Primary, position },
    );

    if let Some(error) = dialogs.errors().first() {
        anyhow::bail!("{error}");
    }
    if controller.store().len() == before {
        anyhow::bail!("no note created, alias and text must not be empty");
    }

    let file_name = display_name(file);
    let key = NoteKey::new(file_name, page, controller.viewport().to_doc(position));
    info!("event=annotate module=cli status=ok key={key}");
    println!("added {key}");
    Ok(())
}

fn run_render(
    invocation: &Invocation,
    file: &Path,
    page: u32,
    zoom: Option<f64>,
    output: Option<&Path>,
) -> Result<()> {
    ensure_pdf_exists(file)?;
    let page_number = page;
    let page = page_index(page)?;
    let controller = invocation.controller(file, page, invocation.zoom(zoom), Mode::View)?;

    let frame = controller.frame().context("failed to render page")?;
    let Some(frame) = frame else {
        anyhow::bail!("no document loaded");
    };

    let mut compositor = RasterCompositor::new();
    compositor.present(frame);
    let Some(image) = compositor.into_image() else {
        anyhow::bail!("nothing was rendered");
    };

    let output = output
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| default_render_output(file, page_number));

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    image
        .save(&output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    println!("{}", output.display());

    Ok(())
}

fn page_index(page: u32) -> Result<u32> {
    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }
    Ok(page - 1)
}

fn parse_point(value: &str) -> Result<(f64, f64), String> {
    let (x, y) = value.split_once(',').ok_or_else(|| format!("expected X,Y, got `{value}`"))?;
    let parse = |part: &str| {
        part.trim()
            .parse::<f64>()
            .ok()
            .filter(|number| number.is_finite())
            .ok_or_else(|| format!("`{part}` is not a number"))
    };
    Ok((parse(x)?, parse(y)?))
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn default_render_output(file: &Path, page: u32) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("page");

    file.with_file_name(format!("{stem}-page-{page}.png"))
}
