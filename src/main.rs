use std::fs::File;
use std::io::{self, Read};
use std::os::fd::AsFd;

use clap::Parser;

use ptykeeper::child::PtySize;
use ptykeeper::cli::{handle_config_action, Args, Command};
use ptykeeper::config::{self, Config};
use ptykeeper::platform::Capabilities;
use ptykeeper::terminal::{restore_at_exit, RawModeGuard, StreamConsumer};
use ptykeeper::Session;

const HOST_FD: libc::c_int = libc::STDIN_FILENO;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("off")).init();

    let args = Args::parse();

    // If --config is specified, require the file to load cleanly.
    // Otherwise, fall back to defaults.
    let config_path = args.config.clone().unwrap_or_else(config::default_path);
    let mut cfg = match Config::load(Some(&config_path)) {
        Ok(c) => c,
        Err(e) if args.config.is_some() => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Warning: {}", e);
            eprintln!("Using default settings.\n");
            Config::default()
        }
    };
    // CLI args > config file > built-in defaults
    args.apply(&mut cfg);
    let command = args.command_line(&cfg);

    if let Some(Command::Config { action }) = args.command {
        if let Err(e) =
            handle_config_action(action, &cfg, &command, &config_path, &mut io::stdout())
        {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        return;
    }

    if let Err(e) = run(&cfg, &command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cfg: &Config, command: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let mut term = StreamConsumer::new(io::stdout());
    let mut session = Session::new(HOST_FD, cfg, Capabilities::detect());
    let signals = session.install_signals()?;
    signals.set_exit_hook(restore_at_exit);

    let mut size = PtySize::of_fd(HOST_FD).unwrap_or_default();
    let _raw = match RawModeGuard::enter() {
        Ok(guard) => Some(guard),
        Err(e) => {
            log::warn!("Input is not a terminal, raw mode not available: {}", e);
            None
        }
    };

    // A failed spawn is already on screen; the next keypress ends the session.
    let _ = session.spawn(command, size, &mut term);

    // Unbuffered, so nothing sits in a buffer that poll cannot see.
    let mut input = File::from(io::stdin().as_fd().try_clone_to_owned()?);
    let mut buf = [0u8; 4096];
    let mut input_closed = false;
    loop {
        session.run(&mut term)?;

        match input.read(&mut buf) {
            Ok(0) if input_closed => {
                // Hung up already; the reap ends the process.
                std::thread::sleep(std::time::Duration::from_millis(10));
            }
            Ok(0) => {
                log::info!("Input closed");
                input_closed = true;
                session.kill(false);
            }
            Ok(n) => {
                // A failed write has already started the kill.
                let _ = session.send(&mut term, &buf[..n]);
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                ) => {}
            Err(e) => return Err(e.into()),
        }

        if let Some(now) = PtySize::of_fd(HOST_FD) {
            if now != size {
                size = now;
                if let Err(e) = session.resize(size) {
                    log::warn!("{}", e);
                }
            }
        }
    }
}
