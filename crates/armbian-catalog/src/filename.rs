//! Structured identity of an Armbian build artifact, recovered from its filename.
//!
//! Filenames follow `Armbian_<ver>_<Board>_<distro>_<branch>_<kernel>[_<tail>...].<ext>`
//! or the community flavour `Armbian_community_<ver>_...`, which shifts every
//! field one token to the right. Lookups past the end of the token list yield
//! empty strings; callers decide what an empty `board` means.

/// Images that ship with a preinstalled application carry one of these
/// names as the suffix of the kernel token (`6.6.31-kali.img.xz`).
pub const APPLICATIONS: &[&str] = &["kali", "homeassistant", "openhab", "omv"];

pub const COMMUNITY_PREFIX: &str = "Armbian_community";

/// Only plain desktop images name their desktop flavour as the variant.
pub const DESKTOP_MARKER: &str = "_desktop.img.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageName {
    pub version: String,
    pub board: String,
    pub distro: String,
    pub branch: String,
    pub variant: String,
    pub application: String,
    pub storage: String,
    pub kernel_version: String,
    pub extension: String,
}

pub fn parse(filename: &str) -> ImageName {
    let tokens: Vec<&str> = filename.split('_').collect();
    let at = |i: usize| tokens.get(i).copied().unwrap_or("");
    let o = version_offset(&tokens);

    let extension = file_extension(filename);
    let kernel_token = strip_extension(at(5 + o), &extension);

    let mut application = String::new();
    let mut storage = String::new();
    if let Some((_, suffix)) = kernel_token.split_once('-') {
        let suffix = cut_at_img(suffix);
        if APPLICATIONS.contains(&suffix) {
            application = suffix.to_string();
        } else if suffix.rsplit('-').next() == Some("ufs") {
            storage = "ufs".to_string();
        }
    }

    let tail = at(6 + o);
    let variant = if filename.contains(DESKTOP_MARKER) {
        tail.to_string()
    } else if tail.starts_with("minimal") {
        "minimal".to_string()
    } else {
        "server".to_string()
    };

    ImageName {
        version: at(1 + o).to_string(),
        board: at(2 + o).to_lowercase(),
        distro: at(3 + o).to_string(),
        branch: at(4 + o).to_string(),
        variant,
        application,
        storage,
        kernel_version: kernel_version(filename, &extension),
        extension,
    }
}

/// Standard names carry the version at token 1, community names at token 2.
fn version_offset(tokens: &[&str]) -> usize {
    match tokens.get(1) {
        Some(t) if looks_like_version(t) => 0,
        _ => 1,
    }
}

// ^\d{2}\.\d
fn looks_like_version(token: &str) -> bool {
    let b = token.as_bytes();
    b.len() >= 4
        && b[0].is_ascii_digit()
        && b[1].is_ascii_digit()
        && b[2] == b'.'
        && b[3].is_ascii_digit()
}

pub fn kernel_version(filename: &str, extension: &str) -> String {
    let tokens: Vec<&str> = filename.split('_').collect();
    let o = version_offset(&tokens);
    let Some(token) = tokens.get(5 + o) else {
        return String::new();
    };
    let token = strip_extension(token, extension);
    let token = token.split('-').next().unwrap_or("");
    cut_at_img(token).to_string()
}

fn strip_extension<'a>(token: &'a str, extension: &str) -> &'a str {
    if extension.is_empty() {
        return token;
    }
    token
        .strip_suffix(extension)
        .and_then(|t| t.strip_suffix('.'))
        .unwrap_or(token)
}

fn cut_at_img(s: &str) -> &str {
    match s.find(".img") {
        Some(i) => &s[..i],
        None => s,
    }
}

struct ExtensionRule {
    name: &'static str,
    extract: fn(&str) -> Option<String>,
}

/// Ordered, first match wins. Every rule returns the compound dotted
/// extension without a leading dot.
const EXTENSION_RULES: &[ExtensionRule] = &[
    ExtensionRule {
        name: "u-boot",
        extract: u_boot_extension,
    },
    ExtensionRule {
        name: "rootfs",
        extract: rootfs_extension,
    },
    ExtensionRule {
        name: "oowow",
        extract: oowow_extension,
    },
    ExtensionRule {
        name: "boot-payload",
        extract: boot_payload_extension,
    },
    ExtensionRule {
        name: "hyperv",
        extract: hyperv_extension,
    },
    ExtensionRule {
        name: "img",
        extract: img_extension,
    },
    ExtensionRule {
        name: "qcow2",
        extract: qcow2_extension,
    },
    ExtensionRule {
        name: "trailing",
        extract: trailing_extension,
    },
];

pub fn file_extension(filename: &str) -> String {
    extension_rule(filename)
        .map(|(_, ext)| ext)
        .unwrap_or_default()
}

fn extension_rule(filename: &str) -> Option<(&'static str, String)> {
    EXTENSION_RULES
        .iter()
        .find_map(|rule| (rule.extract)(filename).map(|ext| (rule.name, ext)))
}

// Armbian_..._6.12.41.u-boot.rom.xz / .u-boot.bin.xz
fn u_boot_extension(filename: &str) -> Option<String> {
    let i = filename.rfind("u-boot.")?;
    let rest = &filename[i..];
    if rest.starts_with("u-boot.rom") || rest.starts_with("u-boot.bin") {
        return Some(rest.to_string());
    }
    None
}

fn rootfs_extension(filename: &str) -> Option<String> {
    let i = filename.rfind(".rootfs.")?;
    Some(filename[i + 1..].to_string())
}

fn oowow_extension(filename: &str) -> Option<String> {
    let i = filename.rfind("oowow.")?;
    if i == 0 || !matches!(filename.as_bytes()[i - 1], b'.' | b'_') {
        return None;
    }
    Some(filename[i..].to_string())
}

// ..._desktop.boot_sm8250-xiaomi-elish-boe.img.xz -> boe.img.xz
fn boot_payload_extension(filename: &str) -> Option<String> {
    let i = filename.find(".boot_")?;
    let payload = &filename[i + ".boot_".len()..];
    let img = payload.find(".img")?;
    let (chip, rest) = payload.split_at(img);
    let flavor = chip.rsplit('-').next().filter(|s| !s.is_empty())?;
    Some(format!("{flavor}{rest}"))
}

fn hyperv_extension(filename: &str) -> Option<String> {
    let i = filename.rfind(".hyperv.")?;
    Some(filename[i + 1..].to_string())
}

fn img_extension(filename: &str) -> Option<String> {
    if let Some(i) = filename.rfind(".img.") {
        return Some(filename[i + 1..].to_string());
    }
    filename.strip_suffix(".img").map(|_| "img".to_string())
}

fn qcow2_extension(filename: &str) -> Option<String> {
    let i = filename.rfind(".qcow2")?;
    Some(filename[i + 1..].to_string())
}

fn trailing_extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    Some(ext.to_string())
}

/// Suffix appended to the image variant in redirect URLs so that images
/// differing only in their packaging get distinct redirects.
pub fn redirect_variant_suffix(extension: &str) -> String {
    if extension.contains("qcow2") {
        return "-qcow2".into();
    }
    if extension.contains("hyperv") {
        return "-hyperv".into();
    }
    if extension.starts_with("u-boot.rom") {
        return "-u-boot-rom".into();
    }
    if extension.starts_with("u-boot") {
        return "-u-boot".into();
    }
    match extension.split('.').next() {
        Some(flavor) if !flavor.is_empty() && flavor != "img" => format!("-{flavor}"),
        _ => String::new(),
    }
}
