//! Line-oriented operator console.
//!
//! Stands in for the touch screen: each stdin line is one command, kiosk
//! events are printed as they arrive.

use anyhow::Context;
use smartlocker_core::SlotId;
use smartlocker_hardware::mock::MockSensorHandle;
use smartlocker_kiosk::AccessCoordinator;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, BufReader};

pub const HELP: &str = "\
Commands:
  login <identity> <secret>        log in as administrator
  logout                           end the administrator session
  passwd <new-secret>              change the administrator secret
  enroll <name>                    enroll a fingerprint
  cancel                           cancel the running enrollment
  delete <slot>                    delete an enrolled fingerprint
  open                             open the lock
  face <image.jpg>                 recognize a face
  face register <name> <image>...  upload reference images
  face train                       retrain the face model
  finger place <tag>               rest a simulated finger on the sensor
  finger lift                      lift the simulated finger
  status                           show kiosk status
  help                             show this help
  quit                             exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaceCommand {
    Recognize { image: PathBuf },
    Register { identity: String, images: Vec<PathBuf> },
    Train,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FingerCommand {
    Place { tag: String },
    Lift,
}

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Login { identity: String, secret: String },
    Logout,
    Passwd { secret: String },
    Enroll { identity: String },
    Cancel,
    Delete { slot: u16 },
    Open,
    Face(FaceCommand),
    Finger(FingerCommand),
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command '{0}', type 'help'")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Invalid slot '{0}'")]
    InvalidSlot(String),
}

fn required<'a>(
    words: &mut impl Iterator<Item = &'a str>,
    usage: &'static str,
) -> Result<String, ParseError> {
    words
        .next()
        .map(str::to_string)
        .ok_or(ParseError::Usage(usage))
}

impl FromStr for ConsoleCommand {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or(ParseError::Empty)?;

        let command = match verb.to_ascii_lowercase().as_str() {
            "login" => {
                const USAGE: &str = "login <identity> <secret>";
                Self::Login {
                    identity: required(&mut words, USAGE)?,
                    secret: required(&mut words, USAGE)?,
                }
            }
            "logout" => Self::Logout,
            "passwd" => Self::Passwd {
                secret: required(&mut words, "passwd <new-secret>")?,
            },
            "enroll" => {
                // Names may contain spaces.
                let identity = words.collect::<Vec<_>>().join(" ");
                if identity.is_empty() {
                    return Err(ParseError::Usage("enroll <name>"));
                }
                Self::Enroll { identity }
            }
            "cancel" => Self::Cancel,
            "delete" => {
                let slot = required(&mut words, "delete <slot>")?;
                Self::Delete {
                    slot: slot.parse().map_err(|_| ParseError::InvalidSlot(slot))?,
                }
            }
            "open" => Self::Open,
            "face" => match words.next() {
                Some("register") => {
                    const USAGE: &str = "face register <name> <image>...";
                    let identity = required(&mut words, USAGE)?;
                    let images: Vec<PathBuf> = words.map(PathBuf::from).collect();
                    if images.is_empty() {
                        return Err(ParseError::Usage(USAGE));
                    }
                    Self::Face(FaceCommand::Register { identity, images })
                }
                Some("train") => Self::Face(FaceCommand::Train),
                Some(image) => Self::Face(FaceCommand::Recognize {
                    image: PathBuf::from(image),
                }),
                None => return Err(ParseError::Usage("face <image.jpg>")),
            },
            "finger" => match words.next() {
                Some("place") => Self::Finger(FingerCommand::Place {
                    tag: required(&mut words, "finger place <tag>")?,
                }),
                Some("lift") => Self::Finger(FingerCommand::Lift),
                _ => return Err(ParseError::Usage("finger place <tag> | finger lift")),
            },
            "status" => Self::Status,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(ParseError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

/// Read commands from stdin until `quit`, end of input or Ctrl-C.
pub async fn run(kiosk: &AccessCoordinator, sensor: Option<MockSensorHandle>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line.context("reading stdin")?,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<ConsoleCommand>() {
            Ok(ConsoleCommand::Quit) => break,
            Ok(command) => {
                if let Err(e) = execute(kiosk, sensor.as_ref(), command).await {
                    println!("Error: {e:#}");
                }
            }
            Err(e) => println!("{e}"),
        }
    }
    Ok(())
}

async fn read_image(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))
}

async fn execute(
    kiosk: &AccessCoordinator,
    sensor: Option<&MockSensorHandle>,
    command: ConsoleCommand,
) -> anyhow::Result<()> {
    match command {
        ConsoleCommand::Login { identity, secret } => {
            kiosk.authenticate(&identity, &secret).await?;
        }
        ConsoleCommand::Logout => {
            if !kiosk.logout() {
                println!("Nobody is logged in");
            }
        }
        ConsoleCommand::Passwd { secret } => {
            kiosk.change_admin_secret(&secret).await?;
            println!("Secret changed");
        }
        ConsoleCommand::Enroll { identity } => {
            let ticket = kiosk.begin_enrollment(&identity).await?;
            println!("Enrolling {}", ticket.identity());
        }
        ConsoleCommand::Cancel => {
            if !kiosk.cancel_enrollment() {
                println!("No enrollment running");
            }
        }
        ConsoleCommand::Delete { slot } => {
            let slot = SlotId::new(slot);
            if kiosk.delete_enrollment(slot).await? {
                println!("Deleted {slot}");
            } else {
                println!("Nothing enrolled in {slot}");
            }
        }
        ConsoleCommand::Open => {
            let outcome = kiosk.manual_activate().await?;
            println!("{outcome:?}");
        }
        ConsoleCommand::Face(FaceCommand::Recognize { image }) => {
            let image = read_image(&image).await?;
            if let Some(outcome) = kiosk.recognize_face(image).await? {
                println!("{outcome:?}");
            }
        }
        ConsoleCommand::Face(FaceCommand::Register { identity, images }) => {
            let mut bytes = Vec::with_capacity(images.len());
            for path in &images {
                bytes.push(read_image(path).await?);
            }
            let uploaded = kiosk.register_face(&identity, bytes).await?;
            println!("Uploaded {uploaded} image(s) for {identity}");
        }
        ConsoleCommand::Face(FaceCommand::Train) => {
            kiosk.train_face_model().await?;
            println!("Face model trained");
        }
        ConsoleCommand::Finger(finger) => {
            let sensor = sensor.context("finger simulation needs sensor.driver = \"mock\"")?;
            match finger {
                FingerCommand::Place { tag } => sensor.place_finger(tag),
                FingerCommand::Lift => sensor.lift_finger(),
            }
        }
        ConsoleCommand::Status => println!("{}", kiosk.status().await?),
        ConsoleCommand::Help => println!("{HELP}"),
        ConsoleCommand::Quit => {}
    }
    Ok(())
}
