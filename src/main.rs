use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use lectern::{
    app_dirs::AppDirs,
    attention::AttentionSample,
    config::{Config, ConfigStore, FileConfigStore},
    engine::{EngineEvent, ReadingEngine},
    error::StoreError,
    persistence::PersistencePolicy,
    report,
    runtime::{CrosstermEventSource, EventSource, FixedTicker, ReaderEvent, Runner, Ticker},
    segmenter::{SegmentMode, Segmenter},
    session::Document,
    simulator::SweepSimulator,
    store::{ProgressStore, SqliteStore},
    ui::{reader_layout, CellGeometry, ReaderView},
    writer::BackgroundWriter,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::Rect,
    Frame, Terminal,
};
use std::{
    error::Error,
    fs::{self, OpenOptions},
    io::{self, stdin, Write},
    path::PathBuf,
    time::Duration,
};

/// sequential reader that tracks attention line by line
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A terminal reader that splits a text into screen-sized units, marks each line read as your pointer (or a simulated reader) sweeps across it, and resumes where you left off."
)]
pub struct Cli {
    /// progress database to use instead of the one in the state directory
    #[clap(long, global = true)]
    db: Option<PathBuf>,

    /// config file to use instead of the default location
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// read a plain-text file
    Read {
        file: PathBuf,

        /// drive the reader with the built-in sweep simulator instead of the pointer
        #[clap(long)]
        simulate: bool,

        /// how the text is split into units
        #[clap(long, value_enum)]
        mode: Option<SegmentMode>,

        /// seed for the simulator
        #[clap(long)]
        seed: Option<u64>,

        /// stay on a unit after it is read instead of moving on
        #[clap(long)]
        no_auto_advance: bool,
    },
    /// print the reading units of a file for the configured page size
    Segment {
        file: PathBuf,

        #[clap(long, value_enum)]
        mode: Option<SegmentMode>,
    },
    /// list stored reading sessions, newest first
    Sessions {
        /// only sessions of this document key
        #[clap(long)]
        document: Option<String>,

        /// export as csv
        #[clap(long)]
        csv: bool,
    },
    /// forget the stored position of a document
    Reset { key: String },
}

impl Cli {
    fn load_config(&self) -> Config {
        let store = match &self.config {
            Some(path) => FileConfigStore::with_path(path),
            None => FileConfigStore::new(),
        };
        let mut config = store.load();
        match &self.command {
            Command::Read {
                mode,
                seed,
                no_auto_advance,
                ..
            } => {
                if let Some(mode) = mode {
                    config.segment_mode = *mode;
                }
                if let Some(seed) = seed {
                    config.simulator.seed = *seed;
                }
                if *no_auto_advance {
                    config.auto_advance = false;
                }
            }
            Command::Segment {
                mode: Some(mode), ..
            } => config.segment_mode = *mode,
            _ => {}
        }
        config
    }

    fn open_store(&self) -> Result<SqliteStore, StoreError> {
        match &self.db {
            Some(path) => SqliteStore::open(path),
            None => SqliteStore::open_default(),
        }
    }
}

const TERMINAL_TOO_SMALL: &str = "terminal too small for this unit, enlarge to continue";

/// State of the interactive reader.
pub struct App<S: ProgressStore> {
    pub engine: ReadingEngine,
    pub policy: PersistencePolicy<S>,
    pub cells: CellGeometry,
    body: Rect,
    pub simulator: Option<SweepSimulator>,
    next_sample_at: i64,
    pub status: Option<String>,
    pub should_quit: bool,
}

impl<S: ProgressStore> App<S> {
    pub fn new(
        document: &Document,
        config: &Config,
        store: S,
        area: Rect,
        simulate: bool,
        now_ms: i64,
    ) -> Self {
        let cells = CellGeometry::from_font(&config.font);
        let font = CellGeometry::terminal_font(&config.font);
        let body = reader_layout(area).body;
        let viewport = cells.viewport(body);
        let segmenter = Segmenter::new(config.segment_mode, &viewport, &font);

        let mut engine = ReadingEngine::new(
            document,
            &segmenter,
            Some(viewport),
            font,
            config.engine_options(),
            now_ms,
        );
        engine.on_document_complete(|stats| {
            log::info!(
                "finished reading: {} words, {} units, {}s",
                stats.total_words,
                stats.total_units,
                stats.reading_time_seconds
            );
        });

        let mut policy = PersistencePolicy::new(store, config.persistence, now_ms);
        let resumed = policy.resume(&mut engine, now_ms);

        let mut app = Self {
            engine,
            policy,
            cells,
            body,
            simulator: simulate.then(|| SweepSimulator::new(config.simulator, &font)),
            next_sample_at: now_ms,
            status: resumed.then(|| "resumed where you left off".to_string()),
            should_quit: false,
        };
        app.check_fit();
        app
    }

    /// Applies one event. Returns whether the screen needs a redraw.
    pub fn handle(&mut self, event: ReaderEvent, now_ms: i64) -> bool {
        let redraw = match event {
            ReaderEvent::Key(key) => {
                self.on_key(key, now_ms);
                true
            }
            ReaderEvent::Pointer { column, row } => {
                let (x, y) = self
                    .cells
                    .pointer_on_lines(column, row, self.engine.line_states());
                self.apply_sample(AttentionSample::new(x, y, now_ms), now_ms)
            }
            ReaderEvent::Sample(sample) => self.apply_sample(sample, now_ms),
            ReaderEvent::Resize(width, height) => {
                self.body = reader_layout(Rect::new(0, 0, width, height)).body;
                let font = self.engine.font();
                self.engine.set_layout(self.cells.viewport(self.body), font);
                if let Some(sim) = self.simulator.as_mut() {
                    sim.reset();
                }
                self.check_fit();
                true
            }
            ReaderEvent::Tick => false,
        };
        self.poll(now_ms) || redraw
    }

    /// Time-driven work: simulated samples and persistence timers.
    pub fn poll(&mut self, now_ms: i64) -> bool {
        let mut redraw = false;
        let interval = self
            .simulator
            .as_ref()
            .map(|sim| sim.sample_interval_ms().max(1) as i64);
        if let Some(interval) = interval {
            while self.next_sample_at <= now_ms {
                let at = self.next_sample_at;
                self.next_sample_at += interval;
                let sample = match (self.simulator.as_mut(), self.engine.active_line()) {
                    (Some(sim), Some(line)) => sim.next_sample(&line.bounds, at),
                    _ => continue,
                };
                redraw |= self.apply_sample(sample, at);
            }
        }
        self.policy.tick(&self.engine, now_ms);
        redraw
    }

    pub fn teardown(&mut self, now_ms: i64) {
        self.policy.teardown(&self.engine, now_ms);
    }

    fn apply_sample(&mut self, sample: AttentionSample, now_ms: i64) -> bool {
        let events = self.engine.process_sample(sample);
        self.after_events(&events, now_ms);
        !events.is_empty()
    }

    fn after_events(&mut self, events: &[EngineEvent], now_ms: i64) {
        self.policy.on_events(events, &self.engine, now_ms);
        for event in events {
            match event {
                EngineEvent::UnitActivated { .. } => {
                    self.status = None;
                    if let Some(sim) = self.simulator.as_mut() {
                        sim.reset();
                    }
                }
                EngineEvent::DocumentCompleted(_) => self.status = None,
                _ => {}
            }
        }
        self.check_fit();
    }

    /// Units are paginated for the terminal size at load time; after a shrink
    /// the active unit can run past the bottom, where lines can't be read.
    fn check_fit(&mut self) {
        if self.engine.line_states().len() > self.body.height as usize {
            self.status = Some(TERMINAL_TOO_SMALL.to_string());
        } else if self.status.as_deref() == Some(TERMINAL_TOO_SMALL) {
            self.status = None;
        }
    }

    fn on_key(&mut self, key: KeyEvent, now_ms: i64) {
        let result = match key.code {
            KeyCode::Esc | KeyCode::Char('q') => {
                self.should_quit = true;
                return;
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
                return;
            }
            KeyCode::Right | KeyCode::Char('n') | KeyCode::PageDown => self.engine.next_unit(now_ms),
            KeyCode::Left | KeyCode::Char('p') | KeyCode::PageUp => {
                self.engine.previous_unit(now_ms)
            }
            _ => return,
        };
        match result {
            Ok(Some(event)) => self.after_events(&[event], now_ms),
            Ok(None) => {}
            Err(err) => self.status = Some(err.to_string()),
        }
    }

    fn draw(&self, f: &mut Frame) {
        let view = ReaderView::new(&self.engine, self.cells)
            .status(self.status.as_deref())
            .simulated(self.simulator.is_some());
        f.render_widget(view, f.area());
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Logs go to a file; the terminal belongs to the reader.
fn init_logging() {
    let Some(path) = AppDirs::log_path() else {
        return;
    };
    if let Some(parent) = path.parent() {
        if fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) else {
        return;
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging();
    let config = cli.load_config();

    match &cli.command {
        Command::Read { file, simulate, .. } => {
            if !stdin().is_tty() {
                let mut cmd = Cli::command();
                cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
            }
            let document = Document::from_file(file)?;
            let store = BackgroundWriter::spawn(cli.open_store()?)?;
            run_read(&document, &config, store, *simulate)
        }
        Command::Segment { file, .. } => {
            let document = Document::from_file(file)?;
            let viewport = lectern::geometry::Viewport::new(
                0.0,
                0.0,
                config.page.width,
                config.page.height,
            );
            let segmenter = Segmenter::new(config.segment_mode, &viewport, &config.font);
            let units = segmenter.segment(&document.text);
            let mut out = io::stdout().lock();
            writeln!(
                out,
                "{} ({} units, {} mode, {} words per unit)\n",
                document.key,
                units.len(),
                segmenter.mode(),
                segmenter.words_per_unit()
            )?;
            out.write_all(report::format_units(&units).as_bytes())?;
            Ok(())
        }
        Command::Sessions { document, csv } => {
            let store = cli.open_store()?;
            let sessions = store.load_sessions(document.as_deref())?;
            if *csv {
                report::write_sessions_csv(io::stdout().lock(), &sessions)?;
            } else {
                print!("{}", report::format_sessions(&sessions));
            }
            Ok(())
        }
        Command::Reset { key } => {
            let store = cli.open_store()?;
            if store.delete_progress(key)? {
                println!("forgot progress for {key}");
            } else {
                println!("no stored progress for {key}");
            }
            Ok(())
        }
    }
}

fn run_read<S: ProgressStore>(
    document: &Document,
    config: &Config,
    store: S,
    simulate: bool,
) -> Result<(), Box<dyn Error>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let size = terminal.size()?;
    let mut app = App::new(
        document,
        config,
        store,
        Rect::new(0, 0, size.width, size.height),
        simulate,
        now_ms(),
    );

    let tick = config
        .tick_ms
        .min(config.simulator.sample_interval_ms)
        .max(1);
    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(tick)),
    );
    let result = run_app(&mut terminal, &mut app, &runner);
    app.teardown(now_ms());

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

fn run_app<B: Backend, S: ProgressStore, E: EventSource, T: Ticker>(
    terminal: &mut Terminal<B>,
    app: &mut App<S>,
    runner: &Runner<E, T>,
) -> Result<(), Box<dyn Error>> {
    terminal.draw(|f| app.draw(f))?;
    while !app.should_quit {
        let event = runner.step();
        if app.handle(event, now_ms()) {
            terminal.draw(|f| app.draw(f))?;
        }
    }
    Ok(())
}
