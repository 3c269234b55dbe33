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

//! Tests every backend must pass.
//!
//! Each test is written once against `StoreBackend` and instantiated for
//! each backend by `contract_tests!` at the bottom of this file.

use std::collections::BTreeSet;

use chrono::prelude::*;
use rayon::prelude::*;

use super::*;
use crate::name::model::{MailboxName, Owner};
use crate::query::MailboxQuery;

fn alice() -> Owner {
    Owner::user("alice")
}

fn root(store: &impl StoreBackend) -> MailboxName {
    store.resolver().namespace_root(&alice()).unwrap()
}

/// `path` is split on `.` into segments below `base`.
fn at(base: &MailboxName, path: &str) -> MailboxName {
    path.split('.')
        .fold(base.clone(), |name, segment| name.child(segment).unwrap())
}

fn relative(base: &MailboxName, name: &MailboxName) -> String {
    name.strip_prefix(base).unwrap().join(".")
}

fn create(store: &impl StoreBackend, name: MailboxName) -> Mailbox {
    let mut mailbox = Mailbox::new(name, alice());
    store.mailbox_mapper().save(&mut mailbox).unwrap();
    mailbox
}

fn append<S: StoreBackend>(
    store: &S,
    mailbox: &Mailbox,
    data: &str,
    flags: &[Flag],
) -> MessageMetadata {
    let mut message = Message::new(data.as_bytes(), Utc::now())
        .with_flags(flags.iter().cloned());
    store.message_mapper().save(mailbox, &mut message).unwrap()
}

fn uids_of(messages: &[Message]) -> Vec<u32> {
    messages.iter().map(|m| m.uid.unwrap().0.get()).collect()
}

fn end_to_end(store: &impl StoreBackend) {
    let inbox_name = store.resolver().inbox(&alice()).unwrap();
    let mut inbox = Mailbox::new(inbox_name.clone(), alice());
    let id = store.mailbox_mapper().save(&mut inbox).unwrap();
    assert_eq!(Some(id), inbox.id);
    assert!(inbox.uid_validity > 0);

    let first = append(store, &inbox, "Subject: one\r\n\r\nfirst\r\n", &[]);
    let second = append(store, &inbox, "Subject: two\r\n\r\nsecond\r\n", &[]);
    assert_eq!(Uid::u(1), first.uid);
    assert_eq!(Uid::u(2), second.uid);
    assert!(second.modseq > first.modseq);

    let mut messages = store.message_mapper();
    assert_eq!(Some(second.modseq), messages.highest_modseq(&inbox).unwrap());

    let updated = messages
        .update_flags(
            &inbox,
            MessageRange::One(Uid::u(1)),
            &FlagsUpdate::add(vec![Flag::Deleted]),
        )
        .unwrap();
    assert_eq!(1, updated.len());

    let expunged = messages
        .expunge_marked_for_deletion(&inbox, MessageRange::All)
        .unwrap();
    assert_eq!(vec![Uid::u(1)], expunged.keys().copied().collect::<Vec<_>>());
    assert!(expunged[&Uid::u(1)].flags.contains(&Flag::Deleted));
    assert_eq!(first.size, expunged[&Uid::u(1)].size);

    let remaining = messages
        .find_in_mailbox(&inbox, MessageRange::All, FetchLevel::Headers, 0)
        .unwrap();
    assert_eq!(vec![2], uids_of(&remaining));
    assert_eq!(
        Some(&b"Subject: two\r\n\r\n"[..]),
        remaining[0].content.as_deref()
    );

    let third = append(store, &inbox, "Subject: three\r\n\r\n", &[]);
    assert_eq!(Uid::u(3), third.uid);

    // The mailbox is the same one when found again by name
    let found = store
        .mailbox_mapper()
        .find_mailbox_by_path(&inbox_name)
        .unwrap();
    assert_eq!(inbox.id, found.id);
    assert_eq!(inbox.uid_validity, found.uid_validity);
    assert_eq!(Some(Uid::u(3)), found.last_uid);
}

fn set(paths: &[&str]) -> BTreeSet<String> {
    paths.iter().map(|&p| p.to_owned()).collect()
}

const QUERY_FIXTURE: &[&str] = &[
    "sub",
    "mailbox",
    "mailboxsub",
    "mailbox.sub",
    "mailbox.sub.sub",
    "submailbox",
    "sub.mailbox",
    "blah.test",
    "blah.test.go",
    "blah.test3",
];

fn query_scenarios(store: &impl StoreBackend) {
    let base = store.resolver().inbox(&alice()).unwrap();
    create(store, base.clone());
    for path in QUERY_FIXTURE {
        create(store, at(&base, path));
    }
    // Mailboxes of another owner never leak in
    let bob = store.resolver().inbox(&Owner::user("bob")).unwrap();
    create(store, bob.clone());
    create(store, at(&bob, "sub"));

    let mut mapper = store.mailbox_mapper();
    let mut run = |expression: &str| -> BTreeSet<String> {
        let query = MailboxQuery::new(base.clone(), expression, '.').unwrap();
        mapper
            .find_mailbox_with_path_like(&query)
            .unwrap()
            .iter()
            .map(|mb| relative(&base, &mb.name))
            .collect()
    };
    assert_eq!(set(&[""]), run(""));
    assert_eq!(
        set(&["sub", "mailbox", "mailboxsub", "submailbox"]),
        run("%")
    );
    assert_eq!(set(QUERY_FIXTURE), run("*"));
    assert_eq!(set(&["mailbox", "mailboxsub"]), run("mailbox%"));
    assert_eq!(set(&["submailbox"]), run("sub%mailbox"));
    assert_eq!(set(&["submailbox", "sub.mailbox"]), run("sub*mailbox"));
    assert_eq!(
        set(&["mailbox.sub", "sub.mailbox", "blah.test", "blah.test3"]),
        run("%.%")
    );
    assert_eq!(set(&["blah.test"]), run("*.test"));
}

fn empty_query_is_find_by_path(store: &impl StoreBackend) {
    let base = at(&root(store), "Archive");
    let mut mapper = store.mailbox_mapper();
    let query = MailboxQuery::new(base.clone(), "", '.').unwrap();
    assert!(mapper.find_mailbox_with_path_like(&query).unwrap().is_empty());
    assert_matches!(
        Err(Error::NxMailbox),
        mapper.find_mailbox_by_path(&base)
    );

    create(store, base.clone());
    create(store, at(&base, "2019"));
    let by_path = mapper.find_mailbox_by_path(&base).unwrap();
    assert_eq!(
        vec![by_path],
        mapper.find_mailbox_with_path_like(&query).unwrap()
    );
}

fn results_are_sorted(store: &impl StoreBackend) {
    let base = root(store);
    for path in &["b", "a.z", "c", "a"] {
        create(store, at(&base, path));
    }

    let mut mapper = store.mailbox_mapper();
    let query = MailboxQuery::children_of(base.clone());
    let found = mapper
        .find_mailbox_with_path_like(&query)
        .unwrap()
        .iter()
        .map(|mb| relative(&base, &mb.name))
        .collect::<Vec<_>>();
    assert_eq!(vec!["a", "a.z", "b", "c"], found);

    let listed = mapper
        .list()
        .unwrap()
        .iter()
        .map(|mb| relative(&base, &mb.name))
        .collect::<Vec<_>>();
    assert_eq!(found, listed);
}

fn rename_moves_inferiors(store: &impl StoreBackend) {
    let base = root(store);
    let mut work = create(store, at(&base, "Work"));
    let a = create(store, at(&base, "Work.A"));
    let b = create(store, at(&base, "Work.A.B"));
    let mut other = create(store, at(&base, "Other"));
    append(store, &b, "Subject: x\r\n\r\n", &[]);

    let mut mapper = store.mailbox_mapper();
    assert!(mapper.has_children(&work).unwrap());
    assert!(!mapper.has_children(&b).unwrap());

    work.name = at(&base, "Projects");
    mapper.save(&mut work).unwrap();

    assert_matches!(
        Err(Error::NxMailbox),
        mapper.find_mailbox_by_path(&at(&base, "Work"))
    );
    assert_matches!(
        Err(Error::NxMailbox),
        mapper.find_mailbox_by_path(&at(&base, "Work.A.B"))
    );
    assert_eq!(
        a.id,
        mapper
            .find_mailbox_by_path(&at(&base, "Projects.A"))
            .unwrap()
            .id
    );
    let moved_b = mapper
        .find_mailbox_by_path(&at(&base, "Projects.A.B"))
        .unwrap();
    assert_eq!(b.id, moved_b.id);
    assert_eq!(b.uid_validity, moved_b.uid_validity);
    assert_eq!(Some(Uid::u(1)), moved_b.last_uid);
    assert_eq!(
        at(&base, "Projects.A.B"),
        mapper.find_mailbox_by_id(b.id.unwrap()).unwrap().name
    );

    other.name = at(&base, "Projects.A");
    assert_matches!(Err(Error::MailboxExists), mapper.save(&mut other));
    assert_eq!(
        other.id,
        mapper.find_mailbox_by_path(&at(&base, "Other")).unwrap().id
    );

    work.name = at(&base, "Projects.A.C");
    assert_matches!(Err(Error::InvalidArgument(..)), mapper.save(&mut work));

    // Moving up the hierarchy onto a name that the rename itself vacates
    let mut moved_a =
        mapper.find_mailbox_by_path(&at(&base, "Projects.A")).unwrap();
    moved_a.name = at(&base, "A");
    mapper.save(&mut moved_a).unwrap();
    assert_eq!(
        b.id,
        mapper.find_mailbox_by_path(&at(&base, "A.B")).unwrap().id
    );
    let projects = mapper.find_mailbox_by_path(&at(&base, "Projects")).unwrap();
    assert!(!mapper.has_children(&projects).unwrap());
}

fn delete_cascades_to_messages(store: &impl StoreBackend) {
    let base = root(store);
    let parent = create(store, at(&base, "Doomed"));
    let child = create(store, at(&base, "Doomed.Child"));
    append(store, &parent, "Subject: x\r\n\r\n", &[]);

    let mut mapper = store.mailbox_mapper();
    mapper.delete(&parent).unwrap();

    assert_matches!(
        Err(Error::NxMailbox),
        mapper.find_mailbox_by_id(parent.id.unwrap())
    );
    assert_matches!(
        Err(Error::NxMailbox),
        mapper.find_mailbox_by_path(&parent.name)
    );
    assert_matches!(Err(Error::NxMailbox), mapper.delete(&parent));
    assert_matches!(
        Err(Error::NxMailbox),
        store.message_mapper().count_messages_in_mailbox(&parent)
    );
    assert_matches!(Err(Error::NxMailbox), store.next_uid(&parent));

    assert_eq!(
        child.id,
        mapper.find_mailbox_by_path(&child.name).unwrap().id
    );
}

fn recreate_bumps_uid_validity(store: &impl StoreBackend) {
    let name = at(&root(store), "Phoenix");
    let first = create(store, name.clone());
    append(store, &first, "Subject: x\r\n\r\n", &[]);
    store.mailbox_mapper().delete(&first).unwrap();

    let second = create(store, name);
    assert_ne!(first.id, second.id);
    assert!(second.uid_validity > first.uid_validity);
    assert_eq!(None, store.last_uid(&second).unwrap());
    let reborn = append(store, &second, "Subject: y\r\n\r\n", &[]);
    assert_eq!(Uid::u(1), reborn.uid);
}

fn create_rejects_duplicates(store: &impl StoreBackend) {
    let name = at(&root(store), "Once");
    create(store, name.clone());
    let mut again = Mailbox::new(name, alice());
    assert_matches!(
        Err(Error::MailboxExists),
        store.mailbox_mapper().save(&mut again)
    );
    assert_eq!(None, again.id);
}

fn ranges_and_limits(store: &impl StoreBackend) {
    let mailbox = create(store, at(&root(store), "Ranges"));
    for _ in 0..5 {
        append(store, &mailbox, "Subject: x\r\n\r\n", &[]);
    }

    let mut mapper = store.message_mapper();
    let mut find = |range: MessageRange, limit: usize| {
        mapper
            .find_in_mailbox(&mailbox, range, FetchLevel::Metadata, limit)
            .map(|found| uids_of(&found))
    };

    assert_eq!(vec![1, 2, 3, 4, 5], find(MessageRange::All, 0).unwrap());
    assert_eq!(vec![1, 2], find(MessageRange::All, 2).unwrap());
    assert_eq!(vec![3, 4, 5], find(MessageRange::From(Uid::u(3)), 0).unwrap());
    assert_eq!(
        vec![2, 3],
        find(MessageRange::Range(Uid::u(2), Uid::u(3)), 0).unwrap()
    );
    assert_eq!(vec![4], find(MessageRange::One(Uid::u(4)), 0).unwrap());
    assert!(find(MessageRange::One(Uid::u(9)), 0).unwrap().is_empty());

    let inverted = MessageRange::Range(Uid::u(4), Uid::u(2));
    assert_matches!(Err(Error::InvalidArgument(..)), find(inverted, 0));
    assert_matches!(
        Err(Error::InvalidArgument(..)),
        MessageRange::range(Uid::u(4), Uid::u(2))
    );

    let mut mapper = store.message_mapper();
    assert_matches!(
        Err(Error::InvalidArgument(..)),
        mapper.update_flags(
            &mailbox,
            inverted,
            &FlagsUpdate::add(vec![Flag::Seen])
        )
    );
    assert_matches!(
        Err(Error::InvalidArgument(..)),
        mapper.expunge_marked_for_deletion(&mailbox, inverted)
    );

    let metadata = mapper
        .find_in_mailbox(&mailbox, MessageRange::All, FetchLevel::Metadata, 1)
        .unwrap();
    assert_eq!(None, metadata[0].content);
    let full = mapper
        .find_in_mailbox(&mailbox, MessageRange::All, FetchLevel::Full, 1)
        .unwrap();
    assert_eq!(Some(&b"Subject: x\r\n\r\n"[..]), full[0].content.as_deref());
}

fn recent_and_unseen(store: &impl StoreBackend) {
    let mailbox = create(store, at(&root(store), "Flags"));
    let mut mapper = store.message_mapper();
    assert_eq!(None, mapper.find_first_unseen_message_uid(&mailbox).unwrap());
    assert!(mapper.find_recent_message_uids(&mailbox).unwrap().is_empty());

    append(store, &mailbox, "a", &[Flag::Seen]);
    append(store, &mailbox, "b", &[]);
    append(store, &mailbox, "c", &[Flag::Recent, Flag::Seen]);
    append(store, &mailbox, "d", &[Flag::Recent]);

    assert_eq!(4, mapper.count_messages_in_mailbox(&mailbox).unwrap());
    assert_eq!(2, mapper.count_unseen_messages_in_mailbox(&mailbox).unwrap());
    assert_eq!(
        vec![Uid::u(3), Uid::u(4)],
        mapper.find_recent_message_uids(&mailbox).unwrap()
    );
    assert_eq!(
        Some(Uid::u(2)),
        mapper.find_first_unseen_message_uid(&mailbox).unwrap()
    );
}

fn copy_is_recent(store: &impl StoreBackend) {
    let base = root(store);
    let src = create(store, at(&base, "Src"));
    let dst = create(store, at(&base, "Dst"));
    append(store, &src, "Subject: x\r\n\r\nbody", &[Flag::Seen]);
    append(store, &src, "Subject: y\r\n\r\nbody", &[]);

    let mut mapper = store.message_mapper();
    let source = mapper
        .find_in_mailbox(
            &src,
            MessageRange::One(Uid::u(2)),
            FetchLevel::Metadata,
            0,
        )
        .unwrap()
        .remove(0);
    let copied = mapper.copy(&dst, &source).unwrap();
    assert_eq!(Uid::u(1), copied.uid);
    assert!(copied.flags.contains(&Flag::Recent));

    let in_dst = mapper
        .find_in_mailbox(&dst, MessageRange::All, FetchLevel::Full, 0)
        .unwrap();
    assert_eq!(dst.id, in_dst[0].mailbox_id);
    assert_eq!(
        Some(&b"Subject: y\r\n\r\nbody"[..]),
        in_dst[0].content.as_deref()
    );
    assert_eq!(source.internal_date, in_dst[0].internal_date);

    // The source is untouched
    assert!(mapper.find_recent_message_uids(&src).unwrap().is_empty());
    assert_eq!(2, mapper.count_messages_in_mailbox(&src).unwrap());

    let mut gone = source;
    gone.uid = Some(Uid::u(7));
    assert_matches!(Err(Error::NxMessage), mapper.copy(&dst, &gone));
}

fn update_flags_takes_fresh_modseqs(store: &impl StoreBackend) {
    let mailbox = create(store, at(&root(store), "Modseq"));
    append(store, &mailbox, "a", &[]);
    append(store, &mailbox, "b", &[Flag::Flagged]);
    append(store, &mailbox, "c", &[]);

    let mut mapper = store.message_mapper();
    let before = mapper.highest_modseq(&mailbox).unwrap().unwrap();
    let updated = mapper
        .update_flags(
            &mailbox,
            MessageRange::All,
            &FlagsUpdate::add(vec![Flag::Flagged]),
        )
        .unwrap();

    // The already-flagged message does not change
    assert_eq!(
        vec![Uid::u(1), Uid::u(3)],
        updated.iter().map(|u| u.uid).collect::<Vec<_>>()
    );
    assert!(updated[0].modseq > before);
    assert!(updated[1].modseq > updated[0].modseq);
    assert!(!updated[0].old_flags.contains(&Flag::Flagged));
    assert!(updated[0].new_flags.contains(&Flag::Flagged));
    assert_eq!(
        Some(updated[1].modseq),
        mapper.highest_modseq(&mailbox).unwrap()
    );

    let again = mapper
        .update_flags(
            &mailbox,
            MessageRange::All,
            &FlagsUpdate::add(vec![Flag::Flagged]),
        )
        .unwrap();
    assert!(again.is_empty());
    assert_eq!(
        Some(updated[1].modseq),
        mapper.highest_modseq(&mailbox).unwrap()
    );

    let found = mapper
        .find_in_mailbox(
            &mailbox,
            MessageRange::One(Uid::u(3)),
            FetchLevel::Metadata,
            0,
        )
        .unwrap();
    assert_eq!(Some(updated[1].modseq), found[0].modseq);

    let replaced = mapper
        .update_flags(
            &mailbox,
            MessageRange::One(Uid::u(2)),
            &FlagsUpdate::replace(vec![Flag::Keyword("$Junk".to_owned())]),
        )
        .unwrap();
    assert_eq!(1, replaced.len());
    assert!(!replaced[0].new_flags.contains(&Flag::Flagged));
}

fn delete_single_message(store: &impl StoreBackend) {
    let mailbox = create(store, at(&root(store), "Single"));
    append(store, &mailbox, "a", &[]);
    append(store, &mailbox, "b", &[]);

    let mut mapper = store.message_mapper();
    let first = mapper
        .find_in_mailbox(&mailbox, MessageRange::All, FetchLevel::Metadata, 1)
        .unwrap()
        .remove(0);
    let modseq = mapper.highest_modseq(&mailbox).unwrap();
    mapper.delete(&mailbox, &first).unwrap();
    assert_matches!(Err(Error::NxMessage), mapper.delete(&mailbox, &first));
    assert_eq!(1, mapper.count_messages_in_mailbox(&mailbox).unwrap());
    assert_eq!(modseq, mapper.highest_modseq(&mailbox).unwrap());
}

fn preassigned_uid_must_be_allocated(store: &impl StoreBackend) {
    let mailbox = create(store, at(&root(store), "Preassigned"));
    append(store, &mailbox, "a", &[]);

    let mut mapper = store.message_mapper();
    let mut message = Message::new(&b"b"[..], Utc::now());
    message.uid = Some(Uid::u(5));
    assert_matches!(
        Err(Error::InvalidArgument(..)),
        mapper.save(&mailbox, &mut message)
    );

    let uid = store.next_uid(&mailbox).unwrap();
    message.uid = Some(uid);
    let saved = mapper.save(&mailbox, &mut message).unwrap();
    assert_eq!(uid, saved.uid);
    assert_eq!(Some(&mailbox.id.unwrap()), message.mailbox_id.as_ref());
}

fn subscriptions(store: &impl StoreBackend) {
    let bob = Owner::user("bob");
    let base = root(store);
    let inbox = at(&base, "INBOX");
    let nowhere = at(&base, "Nowhere");

    let mut mapper = store.subscription_mapper();
    mapper.subscribe(&alice(), &inbox).unwrap();
    mapper.subscribe(&alice(), &inbox).unwrap();
    mapper.subscribe(&alice(), &nowhere).unwrap();
    assert_eq!(
        vec![inbox.clone(), nowhere.clone()]
            .into_iter()
            .collect::<BTreeSet<_>>(),
        mapper.subscriptions(&alice()).unwrap()
    );
    assert!(mapper.subscriptions(&bob).unwrap().is_empty());

    mapper.unsubscribe(&alice(), &nowhere).unwrap();
    mapper.unsubscribe(&alice(), &nowhere).unwrap();
    mapper.unsubscribe(&bob, &inbox).unwrap();
    assert_eq!(
        Some(&inbox),
        mapper.subscriptions(&alice()).unwrap().iter().next()
    );
    assert_eq!(1, mapper.subscriptions(&alice()).unwrap().len());
}

fn concurrent_allocation(store: &impl StoreBackend) {
    let mailbox = create(store, at(&root(store), "Busy"));

    let mut uids = (0..100)
        .into_par_iter()
        .map(|_| store.next_uid(&mailbox).unwrap().0.get())
        .collect::<Vec<_>>();
    uids.sort_unstable();
    assert_eq!((1..=100u32).collect::<Vec<_>>(), uids);
    assert_eq!(Some(Uid::u(100)), store.last_uid(&mailbox).unwrap());

    let mut modseqs = (0..100)
        .into_par_iter()
        .map(|_| store.next_modseq(&mailbox).unwrap().raw())
        .collect::<Vec<_>>();
    modseqs.sort_unstable();
    assert_eq!((1..=100u64).collect::<Vec<_>>(), modseqs);

    // Appends race with each other too
    let mut appended = (0..20)
        .into_par_iter()
        .map(|_| append(store, &mailbox, "x", &[]).uid.0.get())
        .collect::<Vec<_>>();
    appended.sort_unstable();
    assert_eq!((101..=120u32).collect::<Vec<_>>(), appended);
}

fn request_scope_and_execute(store: &impl StoreBackend) {
    let name = at(&root(store), "Scoped");
    let mut mapper = store.mailbox_mapper();

    let id = {
        let mut scope = RequestScope::new(&mut mapper).unwrap();
        let mut mailbox = Mailbox::new(name.clone(), alice());
        scope.save(&mut mailbox).unwrap()
    };

    let found = mapper
        .execute(|m| m.find_mailbox_by_path(&name))
        .unwrap();
    assert_eq!(Some(id), found.id);

    let result: Result<(), Error> = mapper.execute(|m| {
        m.find_mailbox_by_id(id)?;
        Err(Error::invalid("abandon"))
    });
    assert_matches!(Err(Error::InvalidArgument(..)), result);
    // Work done before the failure is not undone
    assert_eq!(Some(id), mapper.find_mailbox_by_path(&name).unwrap().id);
}

macro_rules! contract_tests {
    ($($test:ident),* $(,)*) => {
        mod memory {
            use crate::store::memory::MemoryStore;

            $(
                #[test]
                fn $test() {
                    crate::init_test_log();
                    super::$test(&MemoryStore::default());
                }
            )*
        }

        mod fs {
            use tempfile::TempDir;

            use crate::store::fs::FsStore;
            use crate::support::store_config::StoreConfig;

            $(
                #[test]
                fn $test() {
                    crate::init_test_log();
                    let root = TempDir::new().unwrap();
                    let store = FsStore::init(
                        root.path().join("store"),
                        &StoreConfig::default(),
                    )
                    .unwrap();
                    super::$test(&store);
                }
            )*
        }

        mod fs_slash_delimiter {
            use tempfile::TempDir;

            use crate::store::fs::FsStore;
            use crate::support::store_config::StoreConfig;

            $(
                #[test]
                fn $test() {
                    crate::init_test_log();
                    let root = TempDir::new().unwrap();
                    let mut config = StoreConfig::default();
                    config.names.delimiter = '/';
                    let store =
                        FsStore::init(root.path().join("store"), &config)
                            .unwrap();
                    super::$test(&store);
                }
            )*
        }
    };
}

contract_tests!(
    end_to_end,
    query_scenarios,
    empty_query_is_find_by_path,
    results_are_sorted,
    rename_moves_inferiors,
    delete_cascades_to_messages,
    recreate_bumps_uid_validity,
    create_rejects_duplicates,
    ranges_and_limits,
    recent_and_unseen,
    copy_is_recent,
    update_flags_takes_fresh_modseqs,
    delete_single_message,
    preassigned_uid_must_be_allocated,
    subscriptions,
    concurrent_allocation,
    request_scope_and_execute,
);
