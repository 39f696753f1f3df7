//! Command-line argument parsing: a small hand-rolled parser in the
//! teacher's idiom, since `chunk/debug.rs` and `main.rs` parse their own
//! flags without pulling in a dedicated argument-parsing crate.

use std::path::PathBuf;

use crate::persistence::Difficulty;

#[derive(Debug, Clone, PartialEq)]
pub struct Args {
    pub max_frames: Option<u64>,
    pub world: String,
    pub seed: Option<i64>,
    pub new_world: bool,
    pub worlds_root: PathBuf,
    pub difficulty: Difficulty,
    pub description: Option<String>,
    pub list_worlds: bool,
    pub profile_log: Option<PathBuf>,
    pub profile_frames: Option<u64>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            max_frames: None,
            world: "default".to_string(),
            seed: None,
            new_world: false,
            worlds_root: PathBuf::from("worlds"),
            difficulty: Difficulty::default(),
            description: None,
            list_worlds: false,
            profile_log: None,
            profile_frames: None,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ArgsError {
    #[error("missing value for flag {0}")]
    MissingValue(String),
    #[error("invalid value '{1}' for flag {0}: {2}")]
    InvalidValue(String, String, String),
    #[error("unrecognized argument: {0}")]
    Unrecognized(String),
}

/// Parse CLI flags, in the order a caller would pass `std::env::args()`
/// (including the leading program name, which is skipped).
pub fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Args, ArgsError> {
    let mut out = Args::default();
    let mut iter = args.into_iter().peekable();
    iter.next(); // program name

    fn next_value(flag: &str, iter: &mut impl Iterator<Item = String>) -> Result<String, ArgsError> {
        iter.next().ok_or_else(|| ArgsError::MissingValue(flag.to_string()))
    }

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--max-frames" => {
                let v = next_value(&arg, &mut iter)?;
                out.max_frames = Some(v.parse().map_err(|_| ArgsError::InvalidValue(arg.clone(), v, "expected an integer".to_string()))?);
            }
            "--world" => out.world = next_value(&arg, &mut iter)?,
            "--seed" => {
                let v = next_value(&arg, &mut iter)?;
                out.seed = Some(v.parse().map_err(|_| ArgsError::InvalidValue(arg.clone(), v, "expected an integer".to_string()))?);
            }
            "--new-world" => out.new_world = true,
            "--worlds-root" => out.worlds_root = PathBuf::from(next_value(&arg, &mut iter)?),
            "--difficulty" => {
                let v = next_value(&arg, &mut iter)?;
                out.difficulty = v.parse().map_err(|e| ArgsError::InvalidValue(arg.clone(), v, e))?;
            }
            "--description" => out.description = Some(next_value(&arg, &mut iter)?),
            "--list-worlds" => out.list_worlds = true,
            "--profile-log" => out.profile_log = Some(PathBuf::from(next_value(&arg, &mut iter)?)),
            "--profile-frames" => {
                let v = next_value(&arg, &mut iter)?;
                out.profile_frames = Some(v.parse().map_err(|_| ArgsError::InvalidValue(arg.clone(), v, "expected an integer".to_string()))?);
            }
            other => return Err(ArgsError::Unrecognized(other.to_string())),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(s: &str) -> Result<Args, ArgsError> {
        let mut v = vec!["chunkstream".to_string()];
        v.extend(s.split_whitespace().map(String::from));
        parse(v)
    }

    #[test]
    fn defaults_are_sane_with_no_arguments() {
        let args = parse_str("").unwrap();
        assert_eq!(args.world, "default");
        assert_eq!(args.difficulty, Difficulty::Normal);
        assert!(!args.new_world);
    }

    #[test]
    fn parses_every_flag() {
        let args = parse_str(
            "--max-frames 100 --world alpha --seed 42 --new-world --worlds-root /tmp/worlds --difficulty hard --description hello --list-worlds --profile-log out.csv --profile-frames 50",
        )
        .unwrap();
        assert_eq!(args.max_frames, Some(100));
        assert_eq!(args.world, "alpha");
        assert_eq!(args.seed, Some(42));
        assert!(args.new_world);
        assert_eq!(args.worlds_root, PathBuf::from("/tmp/worlds"));
        assert_eq!(args.difficulty, Difficulty::Hard);
        assert_eq!(args.description, Some("hello".to_string()));
        assert!(args.list_worlds);
        assert_eq!(args.profile_log, Some(PathBuf::from("out.csv")));
        assert_eq!(args.profile_frames, Some(50));
    }

    #[test]
    fn rejects_unknown_flags() {
        assert_eq!(parse_str("--bogus"), Err(ArgsError::Unrecognized("--bogus".to_string())));
    }

    #[test]
    fn rejects_missing_value() {
        assert_eq!(parse_str("--world"), Err(ArgsError::MissingValue("--world".to_string())));
    }

    #[test]
    fn rejects_bad_difficulty() {
        assert!(matches!(parse_str("--difficulty extreme"), Err(ArgsError::InvalidValue(..))));
    }
}
