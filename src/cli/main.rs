//-
// Copyright (c) 2020, Jason Lingle
//
// This file is part of Crymap.
//
// Crymap is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Crymap is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Crymap. If not, see <http://www.gnu.org/licenses/>.

use std::path::{Path, PathBuf};

use log::error;
use structopt::clap;
use structopt::StructOpt;

use crate::store::fs::FsStore;
use crate::store::model::Flag;
use crate::support::store_config::StoreConfig;
use crate::support::sysexits::*;

#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
struct Options {
    /// The store configuration file. Built-in defaults are used if not
    /// given.
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// The root directory of the store
    /// [default: `filesystem.root` from the configuration]
    #[structopt(long, parse(from_os_str))]
    root: Option<PathBuf>,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
pub(super) enum Command {
    /// Create the directory structure of a new store.
    ///
    /// Running this on an existing store does nothing.
    Init,
    /// Create a mailbox.
    Create(MailboxArgs),
    /// Delete a mailbox and all its messages.
    ///
    /// Mailboxes below the deleted mailbox are not affected.
    Delete(MailboxArgs),
    /// Rename a mailbox, along with every mailbox below it.
    Rename(RenameArgs),
    /// List mailboxes matching a pattern.
    ///
    /// `%` matches within one level of the hierarchy; `*` matches anything.
    List(ListArgs),
    /// Append messages to a mailbox.
    Append(AppendArgs),
    /// Permanently remove all messages flagged \Deleted from a mailbox.
    Expunge(MailboxArgs),
    /// Subscribe to a mailbox, whether or not it exists.
    Subscribe(MailboxArgs),
    /// Remove a subscription.
    Unsubscribe(MailboxArgs),
    /// List subscribed mailboxes.
    Subscriptions(OwnerArgs),
}

#[derive(StructOpt)]
pub(super) struct OwnerArgs {
    /// Treat the owner as a group name instead of a login.
    #[structopt(long)]
    pub(super) group: bool,

    /// The login (`alice` or `alice@example.com`) or group which owns the
    /// mailboxes.
    pub(super) owner: String,
}

#[derive(StructOpt)]
pub(super) struct MailboxArgs {
    #[structopt(flatten)]
    pub(super) owner: OwnerArgs,

    /// The mailbox, relative to the owner's namespace.
    pub(super) mailbox: String,
}

#[derive(StructOpt)]
pub(super) struct RenameArgs {
    #[structopt(flatten)]
    pub(super) owner: OwnerArgs,

    /// The current name of the mailbox.
    pub(super) from: String,

    /// The new name of the mailbox.
    pub(super) to: String,
}

#[derive(StructOpt)]
pub(super) struct ListArgs {
    #[structopt(flatten)]
    pub(super) owner: OwnerArgs,

    /// The pattern to match, relative to the owner's namespace.
    #[structopt(default_value = "*")]
    pub(super) pattern: String,
}

#[derive(StructOpt)]
pub(super) struct AppendArgs {
    #[structopt(flatten)]
    pub(super) owner: OwnerArgs,

    /// Append to this mailbox instead of the INBOX.
    #[structopt(short, long)]
    pub(super) mailbox: Option<String>,

    /// Add this flag (e.g., '\Flagged') or keyword to the appended
    /// message(s). Can be passed multiple times.
    #[structopt(parse(try_from_str), short, long, number_of_values(1))]
    pub(super) flag: Vec<Flag>,

    /// The files to append. "-" reads standard input.
    #[structopt(parse(from_os_str), default_value = "-")]
    pub(super) inputs: Vec<PathBuf>,
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let options =
        Options::from_clap(&match Options::clap().get_matches_safe() {
            Ok(matches) => matches,
            Err(
                e @ clap::Error {
                    kind: clap::ErrorKind::HelpDisplayed,
                    ..
                },
            )
            | Err(
                e @ clap::Error {
                    kind: clap::ErrorKind::VersionDisplayed,
                    ..
                },
            ) => {
                println!("{}", e.message);
                return;
            }
            Err(e) => {
                eprintln!("{}", e.message);
                EX_USAGE.exit()
            }
        });

    let config = match options.config {
        None => StoreConfig::default(),
        Some(ref path) => match StoreConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!(
                    "Error in config file at '{}': {}",
                    path.display(),
                    e
                );
                EX_CONFIG.exit()
            }
        },
    };

    let root = match options
        .root
        .clone()
        .or_else(|| config.filesystem.root.clone())
    {
        Some(root) => root,
        None => {
            eprintln!(
                "No store root given; use --root=/path/to/store or set \
                 filesystem.root in the configuration."
            );
            EX_USAGE.exit()
        }
    };

    init_logging(&root);

    let store = match options.command {
        Command::Init => FsStore::init(&root, &config),
        _ => FsStore::open(&root, &config),
    };
    let store = match store {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Unable to open store at '{}': {}", root.display(), e);
            error!("Unable to open store at '{}': {}", root.display(), e);
            Sysexit::from(&e).exit()
        }
    };

    if let Err(e) = super::commands::run(&store, options.command) {
        eprintln!("{}", e);
        error!("Command failed: {}", e);
        Sysexit::from(&e).exit()
    }
}

fn init_logging(root: &Path) {
    if Ok(true) == nix::unistd::isatty(2) {
        // Running interactively; ignore logging configuration and just write
        // to stderr.
        crate::init_simple_log(log::LevelFilter::Info);
        return;
    }

    let log_config_file = root.join("logging.toml");
    if log_config_file.is_file() {
        if let Err(e) = log4rs::init_file(
            &log_config_file,
            log4rs::file::Deserializers::new(),
        ) {
            eprintln!(
                "Failed to initialise logging from '{}': {}",
                log_config_file.display(),
                e
            );
            EX_CONFIG.exit();
        }
        return;
    }

    let formatter = syslog::Formatter3164 {
        facility: syslog::Facility::LOG_MAIL,
        hostname: None,
        process: env!("CARGO_PKG_NAME").to_owned(),
        pid: nix::unistd::getpid().as_raw(),
    };

    // Without syslog there is nowhere for log output to go, but the command
    // itself can still work
    match syslog::unix(formatter) {
        Ok(logger) => {
            let result = log::set_boxed_logger(Box::new(
                syslog::BasicLogger::new(logger),
            ))
            .map(|_| log::set_max_level(log::LevelFilter::Info));
            if let Err(e) = result {
                eprintln!("Failed to initialise logging: {}", e);
            }
        }
        Err(e) => eprintln!("Failed to connect to syslog: {}", e),
    }
}
