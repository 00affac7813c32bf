use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use uinject::client::{DEFAULT_SOCKET_PATH, SOCKET_ENV};
use uinject::{
    DaemonClient, DeviceOptions, EventEmitter, EventType, InputSink, MouseButton,
    VirtualInputDevice, resolve,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Inject keyboard and mouse input through uinput", long_about = None)]
struct Args {
    /// Daemon socket to send events to
    #[arg(long, env = SOCKET_ENV, default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    /// Write to /dev/uinput from this process instead of the daemon
    #[arg(long)]
    direct: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Click a mouse button
    Click {
        /// Milliseconds to wait before clicking
        #[arg(long, default_value_t = 100)]
        delay: u64,

        /// 1 = left, 2 = right, 3 = middle
        button: u32,
    },

    /// Press key chords such as "ctrl+alt+t"
    Key {
        /// Milliseconds to wait before the first chord
        #[arg(long, default_value_t = 100)]
        delay: u64,

        /// Milliseconds spread over the presses and releases of each chord
        #[arg(long, default_value_t = 12)]
        key_delay: u64,

        /// How many times to play all chords
        #[arg(long, default_value_t = 1)]
        repeat: u32,

        /// Milliseconds between repetitions
        #[arg(long, default_value_t = 0)]
        repeat_delay: u64,

        #[arg(required = true)]
        chords: Vec<String>,
    },

    /// Type text
    Type {
        /// Milliseconds to wait before typing
        #[arg(long, default_value_t = 100)]
        delay: u64,

        /// Milliseconds between characters
        #[arg(long, default_value_t = 12)]
        key_delay: u64,

        /// Type the contents of a file, or stdin for "-"
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,

        #[arg(required_unless_present = "file")]
        text: Vec<String>,
    },

    /// Move the pointer
    Mousemove {
        /// Milliseconds to wait before moving
        #[arg(long, default_value_t = 100)]
        delay: u64,

        /// Treat x and y as a position instead of a delta
        #[arg(long)]
        absolute: bool,

        #[arg(allow_negative_numbers = true)]
        x: i32,

        #[arg(allow_negative_numbers = true)]
        y: i32,
    },
}

/// Where emitted events go
enum Transport {
    Daemon(DaemonClient),
    Direct(VirtualInputDevice),
}

impl Transport {
    fn open(args: &Args) -> Self {
        if !args.direct {
            match DaemonClient::connect(&args.socket) {
                Ok(client) => return Transport::Daemon(client),
                Err(e) => debug!("Daemon unavailable ({}), using the device directly", e),
            }
        }
        Transport::Direct(VirtualInputDevice::new(DeviceOptions::default()))
    }
}

impl InputSink for Transport {
    fn emit_raw(&mut self, event_type: EventType, code: u16, value: i32) -> uinject::Result<()> {
        match self {
            Transport::Daemon(client) => client.emit_raw(event_type, code, value),
            Transport::Direct(device) => device.emit_raw(event_type, code, value),
        }
    }
}

fn pause_ms(ms: u64) {
    if ms > 0 {
        thread::sleep(Duration::from_millis(ms));
    }
}

fn read_text(file: &Path) -> anyhow::Result<String> {
    let mut text = String::new();
    if file.as_os_str() == "-" {
        info!("Reading text from stdin");
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
    } else {
        text = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
    }
    Ok(text)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    match &args.command {
        Command::Click { delay, button } => {
            let button = MouseButton::from_ordinal(*button);
            let mut emitter = EventEmitter::new(Transport::open(&args));
            pause_ms(*delay);
            emitter.click(button)?;
        }
        Command::Key {
            delay,
            key_delay,
            repeat,
            repeat_delay,
            chords,
        } => {
            // Reject the whole invocation before anything is pressed
            let sequences = chords
                .iter()
                .map(|chord| resolve(chord))
                .collect::<uinject::Result<Vec<_>>>()?;

            let mut emitter = EventEmitter::new(Transport::open(&args));
            pause_ms(*delay);
            emitter.repeat_sequences(
                &sequences,
                *repeat,
                Duration::from_millis(*key_delay),
                Duration::from_millis(*repeat_delay),
            )?;
        }
        Command::Type {
            delay,
            key_delay,
            file,
            text,
        } => {
            let text = match file {
                Some(file) => read_text(file)?,
                None => text.join(" "),
            };

            let mut emitter = EventEmitter::new(Transport::open(&args));
            pause_ms(*delay);
            emitter.type_text(&text, Duration::from_millis(*key_delay))?;
        }
        Command::Mousemove {
            delay,
            absolute,
            x,
            y,
        } => {
            let mut emitter = EventEmitter::new(Transport::open(&args));
            pause_ms(*delay);
            if *absolute {
                emitter.move_mouse_absolute(*x, *y)?;
            } else {
                emitter.move_mouse_relative(*x, *y)?;
            }
        }
    }

    Ok(())
}
