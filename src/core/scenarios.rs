// End-to-end checks of composition plus the pass pipeline
use std::sync::Arc;

use crate::config::{Config, MinifyLevel};
use super::classifier::SourceUnit;
use super::composer::ProgramComposer;
use super::parser::CSharpParser;
use super::pipeline::Pipeline;
use super::writer::{OutputWriter, SIZE_WARNING_THRESHOLD};

const LEVELS: [MinifyLevel; 4] = [
    MinifyLevel::None,
    MinifyLevel::StripComments,
    MinifyLevel::Lite,
    MinifyLevel::Full,
];

fn units() -> Vec<SourceUnit> {
    vec![
        SourceUnit::new(
            "Program.cs",
            "using System;\nusing System.Linq;\n\npartial class Program : MyGridProgram\n{\n    // how often Main ran\n    private int counterValue;\n\n    public Program()\n    {\n        Runtime.UpdateFrequency = UpdateFrequency.Update100;\n    }\n\n    public void Save() { Storage = counterValue.ToString(); }\n\n    public void Main(string argument, UpdateType updateSource)\n    {\n        counterValue++;\n        Tick();\n    }\n}\n",
        ),
        SourceUnit::new(
            "Program.Tick.cs",
            "using System;\n\npartial class Program\n{\n    void Tick()\n    {\n        Echo(\"Runs: \" + counterValue);\n    }\n}\n",
        ),
        SourceUnit::new(
            "Helper.cs",
            "using System.Text;\n\n/// Formats status text\nclass Helper\n{\n    public string Format(int value) { return value.ToString(); }\n}\n",
        ),
    ]
}

fn build(units: &[SourceUnit], config: Config) -> String {
    let mut parser = CSharpParser::new().unwrap();
    let config = Arc::new(config);
    let composition = ProgramComposer::new(config.clone()).compose(units, &mut parser).unwrap();
    Pipeline::for_config(&config.minify)
        .run(composition, &mut parser)
        .unwrap()
        .text()
        .to_string()
}

fn config_with(level: MinifyLevel, trim: bool) -> Config {
    let mut config = Config::default();
    config.minify.level = level;
    config.minify.trim_types = trim;
    config
}

#[test]
fn test_two_units_fold_into_one_file() {
    let out = build(&units(), Config::default());

    assert_eq!(out.matches("class Program").count(), 1);
    assert!(out.starts_with("using System;\nusing System.Linq;\nusing System.Text;\n\n"));
    let tick = out.find("void Tick()").unwrap();
    let end_of_program = out.find("\n}\n").unwrap();
    let helper = out.find("class Helper").unwrap();
    assert!(tick < end_of_program && end_of_program < helper);
}

#[test]
fn test_trimming_drops_unused_helper() {
    let out = build(&units(), config_with(MinifyLevel::None, true));
    assert!(!out.contains("Helper"));
    assert!(!out.contains("Formats status text"));
    assert!(out.contains("void Tick()"));
}

#[test]
fn test_full_minify_renames_private_state() {
    let out = build(&units(), config_with(MinifyLevel::Full, false));
    assert!(out.contains("void Main(string "));
    assert!(!out.contains("counterValue"));
    assert!(!out.contains("Tick"));
    // the first synthetic name goes to the first renamable declaration
    assert!(out.contains("int a;"));
}

#[test]
fn test_hooks_survive_every_level() {
    for level in LEVELS {
        for trim in [false, true] {
            let out = build(&units(), config_with(level, trim));
            for hook in ["Program(", "void Main(", "void Save("] {
                assert!(out.contains(hook), "{:?} trim={} lost {}", level, trim, hook);
            }
        }
    }
}

#[test]
fn test_every_level_is_deterministic() {
    let mut reversed = units();
    reversed.reverse();
    for level in LEVELS {
        let first = build(&units(), config_with(level, true));
        let second = build(&reversed, config_with(level, true));
        assert_eq!(first, second, "{:?} differs", level);
    }
}

#[test]
fn test_long_statement_moves_to_next_line() {
    let padding = "x".repeat(100);
    let program = SourceUnit::new(
        "Program.cs",
        &format!(
            "class Program\n{{\n    void Main()\n    {{\n        string a = \"{}\";\n        Echo(a + \"and a statement that pushes past the width\");\n    }}\n}}\n",
            padding
        ),
    );
    let mut config = config_with(MinifyLevel::Lite, false);
    config.minify.line_width = 120;
    let out = build(&[program], config);

    for line in out.lines() {
        assert!(line.chars().count() <= 120, "line too long: {}", line);
    }
    assert!(out.lines().count() > 1);
    assert!(out.contains("\"and a statement that pushes past the width\");"));
    assert!(out.contains(&format!("\"{}\";", padding)));
}

#[test]
fn test_oversized_output_still_written() {
    let filler = format!("// {}\n", "y".repeat(97));
    let lines = SIZE_WARNING_THRESHOLD / filler.len() + 1;
    let program = SourceUnit::new("Program.cs", &format!("class Program\n{{\n    void Main() {{ }}\n{}}}\n", filler.repeat(lines)));
    let out = build(&[program], Config::default());
    assert!(out.chars().count() > SIZE_WARNING_THRESHOLD);

    let temp = tempfile::tempdir().unwrap();
    let destination = temp.path().join("Script.cs");
    let written = OutputWriter::write(&out, &destination, temp.path()).unwrap();
    assert_eq!(written.warnings.len(), 1);
    assert_eq!(std::fs::read_to_string(&destination).unwrap(), out);
}
