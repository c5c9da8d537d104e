use std::path::PathBuf;

use crate::compile::{self, CompileOptions};
use crate::manifest::{self, Manifest};

enum Input {
    Dump(PathBuf),
    Demo,
}

pub fn run_cli<I>(args: I) -> i32
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let first = match args.next() {
        Some(arg) => arg,
        None => {
            print_usage();
            return 1;
        }
    };
    if first == "--version" {
        println!("gosling {}", version());
        return 0;
    }
    let input = match first.as_str() {
        "demo" => Input::Demo,
        "lower" => match args.next() {
            Some(path) => Input::Dump(PathBuf::from(path)),
            None => {
                print_usage();
                return 1;
            }
        },
        _ => Input::Dump(PathBuf::from(first)),
    };

    let mut output = None;
    let mut types_path = None;
    let mut opts = CompileOptions::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-o" => match args.next() {
                Some(path) => output = Some(PathBuf::from(path)),
                None => {
                    eprintln!("expected output after -o");
                    return 1;
                }
            },
            "--types" => match args.next() {
                Some(path) => types_path = Some(PathBuf::from(path)),
                None => {
                    eprintln!("expected path after --types");
                    return 1;
                }
            },
            "--word-size" => match args.next().as_deref() {
                Some("4") => opts.word_bytes = 4,
                Some("8") => opts.word_bytes = 8,
                _ => {
                    eprintln!("expected 4 or 8 after --word-size");
                    return 1;
                }
            },
            "--verbose" => opts.verbose = true,
            _ => {
                eprintln!("unknown argument: {}", arg);
                return 1;
            }
        }
    }

    let lowered = match &input {
        Input::Dump(path) => {
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                eprintln!("expected .json program dump");
                return 1;
            }
            compile::compile_file(path, &opts)
        }
        Input::Demo => compile::compile_program(&compile::demo_program(), &opts),
    };
    let lowered = match lowered {
        Ok(lowered) => lowered,
        Err(err) => {
            eprintln!("{}", err);
            return 1;
        }
    };

    let ll_path = output.unwrap_or_else(|| match &input {
        Input::Dump(path) => path.with_extension("ll"),
        Input::Demo => PathBuf::from("demo.ll"),
    });
    if let Err(err) = std::fs::write(&ll_path, &lowered.text) {
        eprintln!("failed to write {}: {}", ll_path.display(), err);
        return 1;
    }

    if let Some(types_path) = types_path {
        let manifest = Manifest::new(opts.word_bytes, lowered.types);
        if let Err(err) = manifest::write_manifest(&types_path, &manifest) {
            eprintln!("{:#}", err);
            return 1;
        }
    }
    0
}

fn print_usage() {
    eprintln!("usage: gosling lower <program.json> [-o output.ll] [--types manifest.json]");
    eprintln!("   or: gosling demo [-o output.ll] [--types manifest.json]");
    eprintln!("flags: --word-size <4|8>  --verbose  --version");
}

fn version() -> String {
    match option_env!("GOSLING_GIT_COMMIT") {
        Some(commit) => format!("{} ({})", env!("CARGO_PKG_VERSION"), commit),
        None => env!("CARGO_PKG_VERSION").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn demo_mode_writes_module_and_manifest() {
        let dir = std::env::temp_dir().join("gosling-cli-demo");
        std::fs::create_dir_all(&dir).expect("mkdir");
        let ll = dir.join("out.ll");
        let types = dir.join("types.json");
        let code = run_cli(args(&[
            "demo",
            "-o",
            ll.to_str().unwrap(),
            "--types",
            types.to_str().unwrap(),
        ]));
        assert_eq!(code, 0);
        let text = std::fs::read_to_string(&ll).expect("read module");
        assert!(text.contains("%runtime._interface = type { i8*, i8* }"));
        let manifest: Manifest =
            serde_json::from_str(&std::fs::read_to_string(&types).expect("read manifest"))
                .expect("parse manifest");
        assert!(!manifest.types.is_empty());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn unknown_flags_fail() {
        assert_eq!(run_cli(args(&["demo", "--frobnicate"])), 1);
    }

    #[test]
    fn non_json_input_is_rejected() {
        assert_eq!(run_cli(args(&["lower", "program.yaml"])), 1);
    }
}
