mod api;
mod config;
mod constants;
mod document;
mod events;
mod generation;
mod media;
mod palette;
mod prompt;
mod save;
mod state;
mod surface;

use crate::config::AppConfig;
use crate::document::{DocumentHandle, Selection};
use crate::events::{EventSink, Notice, NoticeLevel};
use crate::generation::{AcceptOutcome, GenerationSession, TransportEvent, TransportPayload};
use crate::palette::{CommandAction, CommandCatalog, CommandItem, MediaKind, PaletteTrigger};
use crate::prompt::OutputFormat;
use crate::save::DebouncedSaver;
use crate::state::AppState;
use crate::surface::{CommandSurface, SubmitOutcome};
use anyhow::{Context, Result};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Prints notices to the terminal the way the GUI would toast them.
struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Info => eprintln!("  [i] {}", notice.message),
            NoticeLevel::Warning => eprintln!("  [!] {}", notice.message),
            NoticeLevel::Error => eprintln!("  [x] {}", notice.message),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = AppConfig::load();
    let provider_config = config
        .get_active_provider()
        .cloned()
        .with_context(|| format!("No provider named {:?} in config", config.active_provider))?;
    let provider = api::create_provider(&provider_config);

    match provider.check_availability().await {
        Ok(()) => tracing::info!(
            "AI ready: {} ({})",
            provider.name(),
            provider_config.active_model
        ),
        Err(e) => tracing::warn!("AI provider unavailable, generation will fail: {}", e),
    }

    let document_path = std::env::args().nth(1).map(PathBuf::from);
    let text = match &document_path {
        Some(path) if path.exists() => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to open file: {:?}", path))?,
        _ => String::new(),
    };

    let state = AppState::new(document_path.clone(), text);
    let saver = document_path.map(|path| {
        DebouncedSaver::new(path, Duration::from_millis(config.save_debounce_ms))
    });

    let (session, events_rx) = GenerationSession::new(provider, Arc::new(ConsoleSink));
    let session = session.with_system_prompt(provider_config.system_prompt.clone());
    let surface = CommandSurface::new(OutputFormat::Plain, config.default_tone.clone());

    println!("{} - type 'help' for commands", constants::APP_NAME);
    let mut repl = Repl {
        state,
        session,
        surface,
        catalog: CommandCatalog::default(),
        saver,
        palette_matches: None,
        pending_media: None,
    };
    repl.run(events_rx).await?;

    if let Some(saver) = repl.saver.take() {
        saver.shutdown().await;
    }
    Ok(())
}

struct Repl {
    state: AppState,
    session: GenerationSession,
    surface: CommandSurface,
    catalog: CommandCatalog,
    saver: Option<DebouncedSaver>,
    /// Trigger and matches from the last ambiguous palette query, awaiting `pick`.
    palette_matches: Option<(PaletteTrigger, Vec<CommandItem>)>,
    /// Media picker opened from the palette, awaiting a `find` query.
    pending_media: Option<(MediaKind, usize)>,
}

impl Repl {
    async fn run(&mut self, mut events_rx: mpsc::UnboundedReceiver<TransportEvent>) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        self.prompt();
        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    let Some(event) = event else { break };
                    self.render_event(&event);
                    self.session.apply(event);
                }
                line = lines.next_line() => {
                    let Some(line) = line.context("Failed to read stdin")? else { break };
                    if !self.handle_line(line.trim()).await? {
                        break;
                    }
                    self.prompt();
                }
            }
        }
        Ok(())
    }

    fn prompt(&self) {
        print!("> ");
        let _ = std::io::stdout().flush();
    }

    /// Streams chunk text to the terminal as it arrives; everything else is
    /// reported after the session applies it.
    fn render_event(&self, event: &TransportEvent) {
        if event.request_id != self.session.request_id() {
            return;
        }
        match &event.payload {
            TransportPayload::Content(text) => {
                print!("{}", text);
                let _ = std::io::stdout().flush();
            }
            TransportPayload::Reasoning(_) => {}
            TransportPayload::Done => {
                println!();
                println!("  -- ready: accept / reject / regen / diff --");
            }
            TransportPayload::Failed(_) => println!(),
        }
    }

    async fn handle_line(&mut self, line: &str) -> Result<bool> {
        if line.is_empty() {
            return Ok(true);
        }
        if let Some(raw) = line.strip_prefix(constants::PALETTE_TRIGGER) {
            self.run_palette(raw);
            return Ok(true);
        }

        let (cmd, rest) = match line.split_once(' ') {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (line, ""),
        };
        match cmd {
            "help" => self.print_help(),
            "show" => self.show_document(),
            "status" => self.show_status(),
            "select" => self.select(rest),
            "type" => {
                let at = self.state.document.selection().from;
                self.state.document.insert(at, rest);
                self.autosave();
            }
            "ai" => {
                self.surface.set_input(rest);
                match self.surface.submit(Some(&self.state.document), &mut self.session) {
                    SubmitOutcome::Submitted => println!("  generating..."),
                    SubmitOutcome::EmptyInstruction => {
                        println!("  usage: ai <instruction>");
                    }
                    SubmitOutcome::NoDocument => {}
                }
            }
            "format" => match rest {
                "plain" => self.surface.set_format(OutputFormat::Plain),
                "rich" => self.surface.set_format(OutputFormat::Rich),
                _ => println!("  usage: format plain|rich"),
            },
            "tone" => {
                let tone = (rest != "none" && !rest.is_empty()).then(|| rest.to_string());
                self.surface.set_tone(tone);
            }
            "accept" => match self.session.accept(&mut self.state.document) {
                AcceptOutcome::Applied => {
                    println!("  applied");
                    self.autosave();
                }
                AcceptOutcome::NotReady => println!("  nothing to accept"),
                AcceptOutcome::StaleSelection => {}
            },
            "reject" => {
                if self.session.reject() {
                    println!("  discarded");
                } else {
                    println!("  nothing to reject");
                }
            }
            "regen" => match self.session.regenerate(&self.state.document) {
                Ok(()) => println!("  regenerating..."),
                Err(e) => println!("  {}", e),
            },
            "diff" => match self.session.diff_preview() {
                Some(patch) => println!("{}", patch),
                None => println!("  no pending generation to preview"),
            },
            "pick" => self.pick(rest),
            "find" => self.media_search(rest).await,
            "quit" | "exit" => return Ok(false),
            other => println!("  unknown command: {}", other),
        }
        Ok(true)
    }

    fn print_help(&self) {
        println!("  show               print the document with selection markers");
        println!("  select FROM [TO]   set the selection (char offsets)");
        println!("  type TEXT          insert text at the caret");
        println!("  ai INSTRUCTION     ask the AI to write or rewrite the selection");
        println!("  format plain|rich  output format for AI requests");
        println!("  tone NAME|none     tone for AI requests");
        println!("  accept|reject|regen|diff   resolve the pending generation");
        println!("  /QUERY             command palette (e.g. /heading, /image)");
        println!("  pick N             choose from the last palette matches");
        println!("  find QUERY         search media after /image or /video");
        println!("  status, quit");
    }

    fn show_document(&self) {
        let doc = &self.state.document;
        let Selection { from, to } = doc.selection();
        let text = doc.text();
        let before = doc.text_between(0, from);
        let selected = doc.text_between(from, to);
        let after = doc.text_between(to, text.chars().count());
        println!("{}[{}]{}", before, selected, after);
    }

    fn show_status(&self) {
        let state = self.session.state();
        println!("  status: {:?}", state.status);
        if let Some(response) = &state.response {
            println!("  response: {}", response);
        }
        if let Some(reasoning) = &state.reasoning {
            println!("  reasoning: {}", reasoning);
        }
        if let Some(error) = &state.error {
            println!("  error: {}", error);
        }
    }

    fn select(&mut self, rest: &str) {
        let mut parts = rest.split_whitespace();
        let from = parts.next().and_then(|p| p.parse::<usize>().ok());
        let to = parts.next().and_then(|p| p.parse::<usize>().ok());
        match (from, to) {
            (Some(from), Some(to)) => self.state.document.set_selection(Selection::new(from, to)),
            (Some(at), None) => self.state.document.set_selection(Selection::caret(at)),
            _ => println!("  usage: select FROM [TO]"),
        }
    }

    /// Simulates typing `/query` at the caret and dispatching from the palette.
    fn run_palette(&mut self, raw: &str) {
        let at = self.state.document.selection().from;
        let typed = format!("{}{}", constants::PALETTE_TRIGGER, raw);
        self.state.document.insert(at, &typed);

        let text = self.state.document.text();
        let caret = self.state.document.selection().from;
        let Some(trigger) = PaletteTrigger::scan(&text, caret) else {
            println!("  palette does not open mid-word");
            return;
        };

        let matches: Vec<CommandItem> =
            self.catalog.filter(&trigger.query).into_iter().cloned().collect();
        match matches.len() {
            0 => println!("  no command matches {:?}", trigger.query),
            1 => {
                if let Some(item) = matches.into_iter().next() {
                    self.dispatch(item, trigger);
                }
            }
            _ => {
                for (i, item) in matches.iter().enumerate() {
                    println!("  {}: {} - {}", i, item.title, item.description);
                }
                println!("  pick N to choose");
                self.palette_matches = Some((trigger, matches));
            }
        }
    }

    fn pick(&mut self, rest: &str) {
        let Some((trigger, matches)) = self.palette_matches.take() else {
            println!("  no palette matches pending");
            return;
        };
        match rest.parse::<usize>().ok().and_then(|i| matches.get(i).cloned()) {
            Some(item) => self.dispatch(item, trigger),
            None => println!("  usage: pick N"),
        }
    }

    fn dispatch(&mut self, item: CommandItem, trigger: PaletteTrigger) {
        let action = self
            .catalog
            .dispatch(&item, &mut self.state.document, &trigger);
        self.autosave();
        match action {
            None => println!("  inserted {}", item.title),
            Some(CommandAction::OpenAiPrompt(format)) => {
                self.surface.set_format(format);
                println!("  type: ai <instruction>");
            }
            Some(CommandAction::OpenMediaSearch(kind)) => {
                self.pending_media = Some((kind, trigger.span.from));
                println!("  type: find <query>");
            }
            // InsertBlock is applied inside CommandCatalog::dispatch and returns None.
            Some(CommandAction::InsertBlock(_)) => {}
        }
    }

    async fn media_search(&mut self, query: &str) {
        let Some((kind, insert_at)) = self.pending_media.take() else {
            println!("  open a picker first (/image or /video)");
            return;
        };
        if query.is_empty() {
            println!("  usage: find <query>");
            self.pending_media = Some((kind, insert_at));
            return;
        }

        let results = match kind {
            MediaKind::Image => media::search_images(query).await,
            MediaKind::Video => media::search_videos(query).await,
        };
        match results {
            Ok(results) if !results.is_empty() => {
                for result in results.iter().take(5) {
                    println!(
                        "  {} ({}) {}",
                        result.title,
                        result.creator.as_deref().unwrap_or("unknown"),
                        result.thumbnail.as_deref().unwrap_or("")
                    );
                }
                let embed = match kind {
                    MediaKind::Image => results[0].embed_image(),
                    MediaKind::Video => results[0].embed_video(),
                };
                self.state.document.insert(insert_at, &embed);
                self.autosave();
                println!("  embedded {}", results[0].title);
            }
            Ok(_) => println!("  no results for {:?}", query),
            Err(e) => eprintln!("  [x] media search failed: {:#}", e),
        }
    }

    fn autosave(&self) {
        if let Some(saver) = &self.saver {
            saver.schedule(self.state.document.text());
        }
    }
}
