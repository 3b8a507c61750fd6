// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{crate_version, Parser, Subcommand};
use duration_string::DurationString;
use tracing_subscriber::EnvFilter;

use intervalo::audio::{self, AudioEngine, EngineState};
use intervalo::config::Trainer;
use intervalo::exercise::{Comparison, ExerciseGenerator, DEFAULT_OPTION_COUNT};
use intervalo::interval::{self, Direction};
use intervalo::pitch::note_to_pitch;
use intervalo::playback::{IntervalPlayback, Sequencer};
use intervalo::stats::{ExerciseMode, FileStore, PracticeLog};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "An ear trainer for musical intervals."
)]
struct Cli {
    /// The path to the trainer config.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// The audio device to play through. Overrides the config.
    #[arg(short = 'D', long, global = true)]
    device: Option<String>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Plays a single note, e.g. "C4" or "Bb3".
    Note {
        note: String,
        /// How long the note sounds.
        #[arg(short, long, default_value = "1s")]
        duration: String,
    },
    /// Plays notes as a chord.
    Chord {
        notes: Vec<String>,
        /// How long the chord sounds.
        #[arg(short, long, default_value = "1s")]
        duration: String,
    },
    /// Plays an interval by name (2M, 3m, 3M, 4J, 5J, 8J) from a root note.
    Interval {
        root: String,
        name: String,
        /// Play the interval downwards from the root.
        #[arg(long)]
        descending: bool,
    },
    /// Name the interval you hear.
    Identify {
        /// Number of exercises.
        #[arg(short, long, default_value_t = 5)]
        rounds: usize,
        /// Number of answer options.
        #[arg(short, long, default_value_t = DEFAULT_OPTION_COUNT)]
        options: usize,
    },
    /// Say which of two intervals is larger.
    Compare {
        /// Number of exercises.
        #[arg(short, long, default_value_t = 5)]
        rounds: usize,
    },
    /// Shows today's practice statistics.
    Stats {},
}

/// Reads a trimmed line from stdin without blocking the runtime.
async fn prompt(question: String) -> Result<String, Box<dyn Error>> {
    Ok(tokio::task::spawn_blocking(move || -> io::Result<String> {
        print!("{} ", question);
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        Ok(line.trim().to_string())
    })
    .await??)
}

fn parse_duration(value: &str) -> Result<std::time::Duration, Box<dyn Error>> {
    Ok(DurationString::from_string(value.to_string())?.into())
}

fn open_log(trainer: &Trainer) -> Result<PracticeLog<FileStore>, Box<dyn Error>> {
    Ok(PracticeLog::new(FileStore::open(&trainer.stats_path())?))
}

async fn identify(
    trainer: &Trainer,
    engine: Arc<AudioEngine>,
    rounds: usize,
    options: usize,
) -> Result<(), Box<dyn Error>> {
    let sequencer = Sequencer::from_config(engine.clone(), trainer.playback())?;
    let log = open_log(trainer)?;
    let mut generator = ExerciseGenerator::new();

    for round in 1..=rounds {
        let exercise = generator.identification(options)?;
        println!("\nRound {} of {}", round, rounds);
        for (i, option) in exercise.options().iter().enumerate() {
            println!("  {}) {}", i + 1, option);
        }

        let answer = loop {
            sequencer.play(exercise.play()).await;
            let answer = prompt("Your answer (number or name, r to replay):".to_string()).await?;
            if answer != "r" {
                break answer;
            }
        };

        let name = match answer.parse::<usize>() {
            Ok(index) if (1..=exercise.options().len()).contains(&index) => {
                exercise.options()[index - 1].name.to_string()
            }
            _ => answer,
        };

        let correct = exercise.is_correct(&name);
        if correct {
            println!("Correct! {} {}", exercise.interval(), exercise.direction());
            engine.play_success_sound().await;
        } else {
            println!(
                "Not quite: it was {} {}",
                exercise.interval(),
                exercise.direction()
            );
        }
        log.record(ExerciseMode::Identification, correct)?;
    }

    println!("\n{}", log.today()?);
    Ok(())
}

async fn compare(
    trainer: &Trainer,
    engine: Arc<AudioEngine>,
    rounds: usize,
) -> Result<(), Box<dyn Error>> {
    let sequencer = Sequencer::from_config(engine.clone(), trainer.playback())?;
    let log = open_log(trainer)?;
    let mut generator = ExerciseGenerator::new();

    for round in 1..=rounds {
        let exercise = generator.comparison()?;
        println!("\nRound {} of {}", round, rounds);

        let answer = loop {
            sequencer.play_comparison(&exercise).await;
            let answer = prompt("Which is larger? (a, b, e for equal, r to replay):".to_string())
                .await?
                .to_lowercase();
            match answer.as_str() {
                "a" => break Comparison::A,
                "b" => break Comparison::B,
                "e" | "=" => break Comparison::Equal,
                _ => continue,
            }
        };

        let correct = exercise.is_correct(answer);
        if correct {
            println!("Correct!");
            engine.play_success_sound().await;
        } else {
            println!("Not quite: the answer was {}", exercise.answer());
        }
        println!(
            "  A: {}\n  B: {}",
            exercise.a().interval,
            exercise.b().interval
        );
        log.record(ExerciseMode::Comparator, correct)?;
    }

    println!("\n{}", log.today()?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut trainer = match &cli.config {
        Some(path) => Trainer::deserialize(path)?,
        None => Trainer::default(),
    };
    if let Some(device) = &cli.device {
        trainer.set_audio(trainer.audio().clone().with_device(device));
    }
    let engine = Arc::new(AudioEngine::new(trainer.audio().clone()));

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Note { note, duration } => {
            engine.play_note(&note, parse_duration(&duration)?).await?;
        }
        Commands::Chord { notes, duration } => {
            let notes: Vec<&str> = notes.iter().map(String::as_str).collect();
            engine.play_chord(&notes, parse_duration(&duration)?).await?;
        }
        Commands::Interval {
            root,
            name,
            descending,
        } => {
            let root = note_to_pitch(&root)?;
            let interval =
                interval::by_name(&name).ok_or_else(|| format!("unknown interval {}", name))?;
            let direction = if descending {
                Direction::Descending
            } else {
                Direction::Ascending
            };

            let sequencer = Sequencer::from_config(engine.clone(), trainer.playback())?;
            let delay = sequencer.note_delay();
            match sequencer
                .play_interval(root, interval, direction, delay)
                .await
            {
                IntervalPlayback::Played { first, second } => {
                    println!("{} {}: {} then {}", interval, direction, first, second)
                }
                IntervalPlayback::OutOfRange { target } => {
                    println!("{} is outside the playable range.", target)
                }
            }
        }
        Commands::Identify { rounds, options } => {
            identify(&trainer, engine.clone(), rounds, options).await?;
        }
        Commands::Compare { rounds } => {
            compare(&trainer, engine.clone(), rounds).await?;
        }
        Commands::Stats {} => {
            let log = open_log(&trainer)?;
            println!("{}", log.today()?);

            let recent = log.recent_results()?;
            if !recent.is_empty() {
                println!("\nRecent results:");
                for result in recent {
                    println!(
                        "- {} {}",
                        result.mode,
                        if result.success { "correct" } else { "missed" }
                    );
                }
            }
        }
    }

    if let EngineState::Ready(backend) = engine.state() {
        tracing::debug!(backend = %backend, "Done");
    }
    engine.settle().await;

    Ok(())
}
