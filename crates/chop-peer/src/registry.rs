use std::sync::Arc;

use mio::Token;

use crate::connection::Connection;
use crate::error::{PeerError, Result};

/// Token reserved for the listening socket.
pub const LISTENER: Token = Token(0);

/// Live server-side connections, keyed by poll token.
///
/// Slots are reused through a free list. A connection's token is its slot
/// index plus one, so it never collides with [`LISTENER`] and stays stable
/// for the connection's whole life.
pub struct ConnectionRegistry {
    slots: Vec<Option<Arc<Connection>>>,
    free_list: Vec<usize>,
    capacity: Option<usize>,
    active: usize,
}

impl ConnectionRegistry {
    /// Create a registry holding at most `capacity` connections, or any
    /// number if `None`.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            capacity,
            active: 0,
        }
    }

    /// Whether another connection would exceed the capacity bound.
    pub fn is_full(&self) -> bool {
        self.capacity.is_some_and(|cap| self.active >= cap)
    }

    /// Add a connection and return its token.
    pub fn insert(&mut self, connection: Arc<Connection>) -> Result<Token> {
        if self.is_full() {
            return Err(PeerError::RegistryFull {
                capacity: self.capacity.unwrap_or_default(),
            });
        }

        let idx = match self.free_list.pop() {
            Some(idx) => {
                self.slots[idx] = Some(connection);
                idx
            }
            None => {
                self.slots.push(Some(connection));
                self.slots.len() - 1
            }
        };
        self.active += 1;
        Ok(Token(idx + 1))
    }

    pub fn get(&self, token: Token) -> Option<&Arc<Connection>> {
        let idx = token.0.checked_sub(1)?;
        self.slots.get(idx)?.as_ref()
    }

    /// Remove and return the connection behind `token`.
    pub fn remove(&mut self, token: Token) -> Option<Arc<Connection>> {
        let idx = token.0.checked_sub(1)?;
        let connection = self.slots.get_mut(idx)?.take()?;
        self.free_list.push(idx);
        self.active -= 1;
        Some(connection)
    }

    pub fn len(&self) -> usize {
        self.active
    }

    pub fn is_empty(&self) -> bool {
        self.active == 0
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = (Token, &Arc<Connection>)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|conn| (Token(idx + 1), conn)))
    }
}
