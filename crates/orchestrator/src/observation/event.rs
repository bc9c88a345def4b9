#![forbid(unsafe_code)]

use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind};
use std::path::PathBuf;

/// A filesystem change the dispatcher cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    Created(PathBuf),
    Modified(PathBuf),
}

impl FsEvent {
    /// Map a raw `notify` event to zero or more dispatcher events. Folder
    /// creation, metadata-only changes, reads, and removals are dropped; a
    /// rename into a watched location counts as a creation of the new path.
    pub fn classify(event: Event) -> Vec<FsEvent> {
        let Event { kind, mut paths, .. } = event;
        match kind {
            EventKind::Create(CreateKind::Folder) => Vec::new(),
            EventKind::Create(_) => paths.into_iter().map(FsEvent::Created).collect(),
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                paths.into_iter().take(1).map(FsEvent::Created).collect()
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if paths.len() >= 2 {
                    vec![FsEvent::Created(paths.swap_remove(1))]
                } else {
                    Vec::new()
                }
            }
            EventKind::Modify(ModifyKind::Name(_)) | EventKind::Modify(ModifyKind::Metadata(_)) => {
                Vec::new()
            }
            EventKind::Modify(_) => paths.into_iter().map(FsEvent::Modified).collect(),
            EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
                paths.into_iter().map(FsEvent::Modified).collect()
            }
            EventKind::Access(_) | EventKind::Remove(_) | EventKind::Any | EventKind::Other => {
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{DataChange, MetadataKind, RemoveKind};

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |event, path| event.add_path(PathBuf::from(path)))
    }

    #[test]
    fn file_creation_is_created() {
        let events = FsEvent::classify(event(EventKind::Create(CreateKind::File), &["/w/a.exe"]));
        assert_eq!(events, vec![FsEvent::Created("/w/a.exe".into())]);
    }

    #[test]
    fn folder_creation_is_ignored() {
        assert!(FsEvent::classify(event(EventKind::Create(CreateKind::Folder), &["/w/d"])).is_empty());
    }

    #[test]
    fn data_change_and_close_write_are_modified() {
        let data = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/w/a.txt"],
        );
        let close = event(
            EventKind::Access(AccessKind::Close(AccessMode::Write)),
            &["/w/a.txt"],
        );
        assert_eq!(FsEvent::classify(data), vec![FsEvent::Modified("/w/a.txt".into())]);
        assert_eq!(FsEvent::classify(close), vec![FsEvent::Modified("/w/a.txt".into())]);
    }

    #[test]
    fn rename_into_watch_is_created() {
        let both = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/w/a.part", "/w/a.exe"],
        );
        let to = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            &["/w/b.exe"],
        );
        let from = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            &["/w/c.exe"],
        );
        assert_eq!(FsEvent::classify(both), vec![FsEvent::Created("/w/a.exe".into())]);
        assert_eq!(FsEvent::classify(to), vec![FsEvent::Created("/w/b.exe".into())]);
        assert!(FsEvent::classify(from).is_empty());
    }

    #[test]
    fn metadata_reads_and_removals_are_ignored() {
        for kind in [
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            EventKind::Access(AccessKind::Read),
            EventKind::Remove(RemoveKind::File),
            EventKind::Any,
        ] {
            assert!(FsEvent::classify(event(kind, &["/w/a"])).is_empty());
        }
    }
}
