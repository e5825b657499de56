//! Configs compiled into the binary, selectable with `--builtin-config`.

use amend_core::AmendConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinConfig {
    pub name: &'static str,
    pub contents: &'static str,
}

pub const BUILTIN_CONFIGS: &[BuiltinConfig] = &[
    BuiltinConfig {
        name: "fix-echarts-esm.toml",
        contents: include_str!("../builtin-config/fix-echarts-esm.toml"),
    },
    BuiltinConfig {
        name: "fix-vue-echarts-esm.toml",
        contents: include_str!("../builtin-config/fix-vue-echarts-esm.toml"),
    },
];

/// Look up a built-in config by file name, with or without `.toml`.
pub fn find(name: &str) -> Option<&'static BuiltinConfig> {
    let name = name.trim();
    BUILTIN_CONFIGS
        .iter()
        .find(|config| config.name == name || config.name.strip_suffix(".toml") == Some(name))
}

pub fn names() -> impl Iterator<Item = &'static str> {
    BUILTIN_CONFIGS.iter().map(|config| config.name)
}

impl BuiltinConfig {
    pub fn load(&self) -> amend_core::Result<AmendConfig> {
        AmendConfig::parse_toml(self.contents)
    }
}
