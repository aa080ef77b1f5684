//! Cyclic log of room posts.
//!
//! Holds the last `capacity` posts. A new post overwrites the oldest one. Each post
//! carries a timestamp from the room's unique clock, so timestamps strictly increase
//! in insertion order and a client's sync cursor can be compared against them.
//!
//! Post text is kept as the raw bytes the author sent and relayed unchanged.
use crate::identity::Identity;
use crate::room::codec::MAX_POST_TEXT_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub author: Identity,
    pub timestamp: u32,
    pub text: Vec<u8>,
}

impl Post {
    /// Text for logs and summaries. Invalid UTF-8 shows as U+FFFD.
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.text).into_owned()
    }
}

#[derive(Debug)]
pub struct PostStore {
    slots: Vec<Option<Post>>,
    next_idx: usize,
}

impl PostStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            next_idx: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|p| p.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store a post in the next slot, replacing the oldest one when full.
    /// `text` is cut to [`MAX_POST_TEXT_LEN`] bytes.
    pub fn append(&mut self, author: Identity, text: &[u8], timestamp: u32) -> &Post {
        let idx = self.next_idx;
        self.next_idx = (self.next_idx + 1) % self.slots.len();
        self.slots[idx].insert(Post {
            author,
            timestamp,
            text: text[..text.len().min(MAX_POST_TEXT_LEN)].to_vec(),
        })
    }

    /// Oldest post newer than `since` that `reader` did not write.
    pub fn find_next_unsynced_for(&self, reader: &Identity, since: u32) -> Option<&Post> {
        self.iter_oldest_first()
            .find(|p| p.timestamp > since && !p.author.matches(reader))
    }

    /// Posts from oldest to newest.
    pub fn iter_oldest_first(&self) -> impl Iterator<Item = &Post> {
        let n = self.slots.len();
        (0..n).filter_map(move |k| self.slots[(self.next_idx + k) % n].as_ref())
    }

    /// Number of posts newer than `since` written by someone other than `reader`.
    pub fn unsynced_count(&self, reader: &Identity, since: u32) -> usize {
        self.iter_oldest_first()
            .filter(|p| p.timestamp > since && !p.author.matches(reader))
            .count()
    }

    pub fn newest(&self) -> Option<&Post> {
        self.iter_oldest_first().last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(b: u8) -> Identity {
        Identity::from_bytes([b; 32])
    }

    #[test]
    fn never_returns_own_posts() {
        let mut store = PostStore::new(4);
        store.append(id(1), b"mine", 10);
        store.append(id(2), b"theirs", 11);
        let next = store.find_next_unsynced_for(&id(1), 0).unwrap();
        assert_eq!(next.text, b"theirs");
        assert!(store.find_next_unsynced_for(&id(1), 11).is_none());
    }

    #[test]
    fn overwrites_oldest_and_scans_from_oldest() {
        let mut store = PostStore::new(3);
        for ts in 1..=5u32 {
            store.append(id(9), format!("p{ts}").as_bytes(), ts * 10);
        }
        assert_eq!(store.len(), 3);
        let order: Vec<u32> = store.iter_oldest_first().map(|p| p.timestamp).collect();
        assert_eq!(order, vec![30, 40, 50]);
        assert_eq!(store.find_next_unsynced_for(&id(1), 0).unwrap().timestamp, 30);
        assert_eq!(store.find_next_unsynced_for(&id(1), 35).unwrap().timestamp, 40);
        assert_eq!(store.unsynced_count(&id(1), 35), 2);
        assert_eq!(store.newest().unwrap().timestamp, 50);
    }

    #[test]
    fn long_text_is_cut_at_byte_limit() {
        let mut store = PostStore::new(2);
        let text = "é".repeat(100);
        let post = store.append(id(1), text.as_bytes(), 1);
        assert_eq!(post.text.len(), MAX_POST_TEXT_LEN);
        assert_eq!(&post.text[..], &text.as_bytes()[..MAX_POST_TEXT_LEN]);
    }

    #[test]
    fn text_bytes_are_kept_verbatim() {
        let mut store = PostStore::new(2);
        let post = store.append(id(1), b"caf\xe9 \xff", 1);
        assert_eq!(post.text, b"caf\xe9 \xff");
        assert_eq!(post.text_lossy(), "caf\u{fffd} \u{fffd}");
    }
}
