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

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use chrono::prelude::*;
use log::info;

use super::main::{
    AppendArgs, Command, ListArgs, MailboxArgs, OwnerArgs, RenameArgs,
};
use crate::name::model::{MailboxName, Owner};
use crate::query::MailboxQuery;
use crate::store::fs::FsStore;
use crate::store::model::*;
use crate::store::{
    MailboxMapper, MessageMapper, RequestScope, StoreBackend,
    SubscriptionMapper,
};
use crate::support::error::Error;

/// Translates between command-line spellings and store names.
struct Context<'a> {
    store: &'a FsStore,
    delimiter: char,
}

impl<'a> Context<'a> {
    fn owner(&self, args: &OwnerArgs) -> Result<Owner, Error> {
        if args.group {
            Ok(Owner::group(args.owner.as_str()))
        } else {
            self.store.resolver().owner_from_login(&args.owner)
        }
    }

    /// Qualify `raw`, whose levels are separated by the configured
    /// delimiter, within `owner`'s namespace.
    fn name(&self, owner: &Owner, raw: &str) -> Result<MailboxName, Error> {
        let relative = MailboxName::relative(raw.split(self.delimiter))?;
        self.store.resolver().qualify(owner, &relative)
    }

    /// The inverse of `name`.
    fn display(&self, name: &MailboxName) -> String {
        match self.store.resolver().relativise(name) {
            Ok((_, relative)) => relative
                .segments()
                .collect::<Vec<_>>()
                .join(&self.delimiter.to_string()),
            Err(_) => name.to_string(),
        }
    }

    fn find(&self, args: &MailboxArgs) -> Result<(Owner, Mailbox), Error> {
        let owner = self.owner(&args.owner)?;
        let name = self.name(&owner, &args.mailbox)?;
        let mailbox =
            self.store.mailbox_mapper().find_mailbox_by_path(&name)?;
        Ok((owner, mailbox))
    }
}

pub(super) fn run(store: &FsStore, command: Command) -> Result<(), Error> {
    let cx = Context {
        store,
        delimiter: store.codec().delimiter(),
    };

    match command {
        Command::Init => {
            println!("Store ready at {}", store.root().display());
            Ok(())
        }
        Command::Create(args) => create(&cx, args),
        Command::Delete(args) => delete(&cx, args),
        Command::Rename(args) => rename(&cx, args),
        Command::List(args) => list(&cx, args),
        Command::Append(args) => append(&cx, args),
        Command::Expunge(args) => expunge(&cx, args),
        Command::Subscribe(args) => {
            let owner = cx.owner(&args.owner)?;
            let name = cx.name(&owner, &args.mailbox)?;
            store.subscription_mapper().subscribe(&owner, &name)
        }
        Command::Unsubscribe(args) => {
            let owner = cx.owner(&args.owner)?;
            let name = cx.name(&owner, &args.mailbox)?;
            store.subscription_mapper().unsubscribe(&owner, &name)
        }
        Command::Subscriptions(args) => {
            let owner = cx.owner(&args)?;
            for name in store.subscription_mapper().subscriptions(&owner)? {
                println!("{}", cx.display(&name));
            }
            Ok(())
        }
    }
}

fn create(cx: &Context<'_>, args: MailboxArgs) -> Result<(), Error> {
    let owner = cx.owner(&args.owner)?;
    let mut mailbox = Mailbox::new(cx.name(&owner, &args.mailbox)?, owner);
    let id = cx.store.mailbox_mapper().save(&mut mailbox)?;
    println!(
        "Created {} (id {}, UID validity {})",
        cx.display(&mailbox.name),
        id,
        mailbox.uid_validity
    );
    Ok(())
}

fn delete(cx: &Context<'_>, args: MailboxArgs) -> Result<(), Error> {
    let (_, mailbox) = cx.find(&args)?;
    cx.store.mailbox_mapper().delete(&mailbox)
}

fn rename(cx: &Context<'_>, args: RenameArgs) -> Result<(), Error> {
    let owner = cx.owner(&args.owner)?;
    let from = cx.name(&owner, &args.from)?;
    let to = cx.name(&owner, &args.to)?;

    let mut mapper = cx.store.mailbox_mapper();
    let mut mapper = RequestScope::new(&mut mapper)?;
    let mut mailbox = mapper.find_mailbox_by_path(&from)?;
    mailbox.name = to;
    mapper.save(&mut mailbox)?;
    Ok(())
}

fn list(cx: &Context<'_>, args: ListArgs) -> Result<(), Error> {
    let owner = cx.owner(&args.owner)?;
    let root = cx.store.resolver().namespace_root(&owner)?;
    let query = MailboxQuery::with_wildcards(
        root,
        args.pattern,
        cx.delimiter,
        cx.store.codec().wildcards(),
    )?;

    let mut mailboxes = cx.store.mailbox_mapper();
    let mut messages = cx.store.message_mapper();
    for mailbox in mailboxes.find_mailbox_with_path_like(&query)? {
        let count = messages.count_messages_in_mailbox(&mailbox)?;
        let unseen = messages.count_unseen_messages_in_mailbox(&mailbox)?;
        println!(
            "{}\t{} messages, {} unseen, UID validity {}",
            cx.display(&mailbox.name),
            count,
            unseen,
            mailbox.uid_validity
        );
    }
    Ok(())
}

fn append(cx: &Context<'_>, args: AppendArgs) -> Result<(), Error> {
    let owner = cx.owner(&args.owner)?;
    let name = match args.mailbox {
        Some(ref mailbox) => cx.name(&owner, mailbox)?,
        None => cx.store.resolver().inbox(&owner)?,
    };
    let mailbox = cx.store.mailbox_mapper().find_mailbox_by_path(&name)?;

    let mut messages = cx.store.message_mapper();
    for input in &args.inputs {
        let data = read_input(input)?;
        let mut message = Message::new(data, Utc::now())
            .with_flags(args.flag.iter().cloned());
        let saved = messages.save(&mailbox, &mut message)?;
        info!(
            "Appended {} to {} as UID {}",
            input.display(),
            mailbox.name,
            saved.uid
        );
        println!("{}\t{}", input.display(), saved.uid);
    }
    Ok(())
}

fn read_input(input: &Path) -> Result<Vec<u8>, Error> {
    let mut data = Vec::new();
    if Path::new("-") == input {
        io::stdin().read_to_end(&mut data)?;
    } else {
        fs::File::open(input)?.read_to_end(&mut data)?;
    }
    Ok(data)
}

fn expunge(cx: &Context<'_>, args: MailboxArgs) -> Result<(), Error> {
    let (_, mailbox) = cx.find(&args)?;
    let expunged = cx
        .store
        .message_mapper()
        .expunge_marked_for_deletion(&mailbox, MessageRange::All)?;
    for uid in expunged.keys() {
        println!("{}", uid);
    }
    Ok(())
}
