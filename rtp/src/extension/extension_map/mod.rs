
use std::collections::HashMap;

use super::ExtensionKind;
use crate::error::{Error, Result};

pub const MIN_EXTENSION_ID: u8 = 1;
pub const MAX_EXTENSION_ID: u8 = 255;

/// ExtensionMap binds the extension ids negotiated through `a=extmap` to the
/// extension kinds they carry, in both directions.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtensionMap {
    ids: HashMap<ExtensionKind, u8>,
    kinds: HashMap<u8, ExtensionKind>,
}

impl ExtensionMap {
    pub fn new() -> Self {
        ExtensionMap::default()
    }

    /// Registers `kind` under `id`. Registering the same pair twice is a
    /// no-op; reusing an id or re-registering a kind under another id fails.
    pub fn register(&mut self, kind: ExtensionKind, id: u8) -> Result<()> {
        if id < MIN_EXTENSION_ID {
            return Err(Error::ErrExtensionIdRange(id));
        }

        if let Some(registered) = self.ids.get(&kind) {
            if *registered == id {
                return Ok(());
            }
            return Err(Error::ErrExtensionAlreadyRegistered(kind.uri(), *registered));
        }
        if self.kinds.contains_key(&id) {
            return Err(Error::ErrExtensionIdInUse(id));
        }

        self.ids.insert(kind, id);
        self.kinds.insert(id, kind);
        Ok(())
    }

    pub fn register_by_uri(&mut self, id: u8, uri: &str) -> Result<()> {
        let kind =
            ExtensionKind::from_uri(uri).ok_or_else(|| Error::ErrUnknownExtensionUri(uri.to_owned()))?;
        self.register(kind, id)
    }

    /// Removes the registration for `uri`, returning the id it was bound to.
    pub fn deregister(&mut self, uri: &str) -> Option<u8> {
        let kind = ExtensionKind::from_uri(uri)?;
        let id = self.ids.remove(&kind)?;
        self.kinds.remove(&id);
        Some(id)
    }

    pub fn id(&self, kind: ExtensionKind) -> Option<u8> {
        self.ids.get(&kind).copied()
    }

    pub fn kind(&self, id: u8) -> Option<ExtensionKind> {
        self.kinds.get(&id).copied()
    }

    pub fn is_registered(&self, kind: ExtensionKind) -> bool {
        self.ids.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterates `(id, kind)` pairs in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, ExtensionKind)> + '_ {
        let mut pairs: Vec<(u8, ExtensionKind)> =
            self.kinds.iter().map(|(id, kind)| (*id, *kind)).collect();
        pairs.sort_by_key(|(id, _)| *id);
        pairs.into_iter()
    }
}
