//! Process-wide string interning. Paths, label parts, and output names
//! repeat heavily across a build graph; interning them once lets everything
//! downstream compare and copy handles instead of strings.

use std::collections::hash_map::RandomState;
use std::collections::HashSet;
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::ptr;
use std::sync::{Mutex, OnceLock};

/// The sentinel storage every empty atom points at, so empty atoms stay
/// pointer-equal to each other.
static EMPTY: &str = "";

// Interning happens from all loader workers at once, so the pool is split
// into shards keyed by string hash: two workers interning different paths
// almost never contend on the same lock.
const SHARD_COUNT: usize = 16;

struct Pool {
    hasher: RandomState,
    shards: [Mutex<HashSet<&'static str>>; SHARD_COUNT],
}

impl Pool {
    fn global() -> &'static Pool {
        static POOL: OnceLock<Pool> = OnceLock::new();
        POOL.get_or_init(|| Pool {
            hasher: RandomState::new(),
            shards: std::array::from_fn(|_| Mutex::new(HashSet::new())),
        })
    }

    fn intern(&self, s: &str) -> &'static str {
        if s.is_empty() {
            return EMPTY;
        }
        let mut hasher = self.hasher.build_hasher();
        s.hash(&mut hasher);
        let shard = &self.shards[hasher.finish() as usize % SHARD_COUNT];

        let mut entries = shard.lock().unwrap();
        if let Some(existing) = entries.get(s) {
            return *existing;
        }
        // First sighting: the string joins the process-lifetime arena.
        let stored: &'static str = Box::leak(s.to_string().into_boxed_str());
        entries.insert(stored);
        stored
    }
}

/// Interns a string, returning its canonical storage.
pub fn intern(s: &str) -> &'static str {
    Pool::global().intern(s)
}

/// A handle to an interned string. Two atoms with equal content share
/// storage, so equality is a pointer comparison. Atoms live for the rest of
/// the process.
#[derive(Clone, Copy)]
pub struct Atom(&'static str);

impl Atom {
    pub fn new(s: &str) -> Atom {
        Atom(intern(s))
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Atom {
    fn default() -> Atom {
        Atom(EMPTY)
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Atom) -> bool {
        // Content equality, by the interning invariant.
        ptr::eq(self.0, other.0)
    }
}

impl Eq for Atom {}

// Hashing and ordering go through the content, not the pointer: emitted
// files are sorted by these comparisons and must not vary from run to run
// with allocator layout.
impl Hash for Atom {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl Ord for Atom {
    fn cmp(&self, other: &Atom) -> std::cmp::Ordering {
        self.0.cmp(other.0)
    }
}

impl PartialOrd for Atom {
    fn partial_cmp(&self, other: &Atom) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Atom({:?})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_identity_matches_content() {
        let dynamic = format!("hel{}", "lo");
        let a = Atom::new("hello");
        let b = Atom::new(&dynamic);
        assert_eq!(a, b);
        assert!(ptr::eq(a.as_str(), b.as_str()));
        assert_ne!(Atom::new("hello"), Atom::new("world"));
    }

    #[test]
    fn empty_atom_is_sentinel() {
        assert!(Atom::default().is_empty());
        assert_eq!(Atom::default(), Atom::new(""));
        assert!(ptr::eq(Atom::default().as_str(), Atom::new("").as_str()));
    }

    #[test]
    fn ordering_is_by_content() {
        let mut atoms = vec![Atom::new("b"), Atom::new("a"), Atom::new("c")];
        atoms.sort();
        let sorted: Vec<&str> = atoms.iter().map(|a| a.as_str()).collect();
        assert_eq!(sorted, ["a", "b", "c"]);
    }

    #[test]
    fn concurrent_interning_converges() {
        // Many workers intern overlapping strings; every content class must
        // collapse to one storage.
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    (0..64)
                        .map(|i| Atom::new(&format!("//path/{}", i % 16)))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let results: Vec<Vec<Atom>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let reference = &results[0];
        for other in &results[1..] {
            for (a, b) in reference.iter().zip(other) {
                assert!(ptr::eq(a.as_str(), b.as_str()));
            }
        }
    }
}
