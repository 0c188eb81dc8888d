//! Named location bundles.

use crate::options::PresetIdentity;

#[derive(Debug, Clone, Copy)]
pub struct Preset {
    pub name: &'static str,
    pub title: &'static str,
    pub include: &'static [&'static str],
    pub exclude: &'static [&'static str],
}

pub const PRESETS: &[Preset] = &[
    Preset {
        name: "denmark",
        title: "Denmark",
        include: &["denmark", "danmark", "copenhagen", "københavn", "aarhus", "odense", "aalborg"],
        exclude: &[],
    },
    Preset {
        name: "estonia",
        title: "Estonia",
        include: &["estonia", "eesti", "tallinn", "tartu"],
        exclude: &[],
    },
    Preset {
        name: "finland",
        title: "Finland",
        include: &[
            "finland", "suomi", "helsinki", "espoo", "tampere", "vantaa", "oulu", "turku",
            "jyväskylä", "lahti", "kuopio",
        ],
        exclude: &[],
    },
    Preset {
        name: "iceland",
        title: "Iceland",
        include: &["iceland", "ísland", "reykjavik", "reykjavík"],
        exclude: &[],
    },
    Preset {
        name: "norway",
        title: "Norway",
        include: &["norway", "norge", "oslo", "bergen", "trondheim", "stavanger"],
        exclude: &[],
    },
    Preset {
        name: "sweden",
        title: "Sweden",
        include: &["sweden", "sverige", "stockholm", "gothenburg", "göteborg", "malmö", "uppsala"],
        exclude: &[],
    },
    Preset {
        name: "georgia",
        title: "Georgia",
        include: &["georgia", "tbilisi", "batumi", "kutaisi"],
        exclude: &["atlanta", "savannah", "usa", "united states", "ga"],
    },
];

pub fn lookup(name: &str) -> Option<&'static Preset> {
    let name = name.trim();
    PRESETS.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

/// Presets ordered by name.
pub fn sorted() -> Vec<&'static Preset> {
    let mut all: Vec<&'static Preset> = PRESETS.iter().collect();
    all.sort_by_key(|p| p.name);
    all
}

pub fn names() -> Vec<&'static str> {
    sorted().into_iter().map(|p| p.name).collect()
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

impl Preset {
    /// Fingerprint of the location definition; changes whenever include/exclude change.
    pub fn checksum(&self) -> String {
        let mut canonical = self.include.join("\n");
        canonical.push('\0');
        canonical.push_str(&self.exclude.join("\n"));
        format!("{:016x}", fnv1a64(canonical.as_bytes()))
    }

    pub fn identity(&self) -> PresetIdentity {
        PresetIdentity {
            name: self.name.to_string(),
            title: self.title.to_string(),
            checksum: self.checksum(),
        }
    }
}
