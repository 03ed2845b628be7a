//! Built-in name themes and reserved infrastructure names.

use sha2::{Digest, Sha256};

/// Names held by infrastructure roles. Never handed to workers.
pub const RESERVED_NAMES: &[&str] = &[
    "mayor", "deacon", "witness", "refinery", "overseer", "crew", "polecat", "polecats", "boot",
];

const MAD_MAX: &[&str] = &[
    "furiosa", "nux", "slit", "rictus", "dementus", "capable", "toast", "dag", "cheedo",
    "angharad", "valkyrie", "keeper", "morsov", "scrotus", "corpus", "splendid", "immortan",
    "toecutter", "goose", "nightrider", "glory", "bubba", "jessie", "fifi", "bullet", "ace",
    "mudguts", "coma", "organic", "praetorian", "vuvalini", "doof", "chumbucket", "jedediah",
    "scabrous", "buzzard", "citadel", "gastank", "blackfinger", "wretched",
];

const MINERALS: &[&str] = &[
    "obsidian", "quartz", "jasper", "onyx", "opal", "topaz", "garnet", "ruby", "amber", "jade",
    "beryl", "cobalt", "flint", "galena", "gypsum", "hematite", "jet", "lapis", "malachite",
    "mica", "olivine", "pyrite", "sapphire", "slate", "talc", "zircon", "agate", "basalt",
    "calcite", "diamond", "emerald", "feldspar", "granite", "marble", "peridot", "tourmaline",
    "turquoise", "spinel", "azurite", "citrine",
];

const WASTELAND: &[&str] = &[
    "rust", "scrap", "ash", "cinder", "dune", "ember", "grit", "husk", "rivet", "salvage",
    "smog", "soot", "static", "torch", "vapor", "wreck", "cog", "piston", "sprocket", "gasket",
    "tumble", "drift", "scorch", "hollow", "shard", "brine", "char", "dust", "flare", "gauge",
    "crank", "fuse", "ratchet", "sump", "welder", "jerrycan", "tinder", "lug", "spanner", "blight",
];

/// Built-in themes, sorted by name.
const BUILTIN_THEMES: &[(&str, &[&str])] = &[
    ("mad-max", MAD_MAX),
    ("minerals", MINERALS),
    ("wasteland", WASTELAND),
];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// Names of every built-in theme, sorted.
pub fn builtin_theme_names() -> Vec<&'static str> {
    let mut names: Vec<_> = BUILTIN_THEMES.iter().map(|(name, _)| *name).collect();
    names.sort_unstable();
    names
}

/// A built-in theme's names in declared order, reserved names removed.
pub fn builtin_theme(theme: &str) -> Option<Vec<String>> {
    BUILTIN_THEMES
        .iter()
        .find(|(name, _)| *name == theme)
        .map(|(_, names)| {
            names
                .iter()
                .filter(|n| !is_reserved(n))
                .map(|n| (*n).to_string())
                .collect()
        })
}

/// Default theme for a rig: stable across runs, derived from the rig name.
pub fn theme_for_rig(rig_name: &str) -> &'static str {
    let themes = builtin_theme_names();
    let digest = Sha256::digest(rig_name.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let index = u64::from_be_bytes(prefix) % themes.len() as u64;
    themes[usize::try_from(index).unwrap_or_default()]
}
