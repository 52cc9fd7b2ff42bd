//! Boundary to the renderer subprocess shim.
//!
//! The shim runs inside the renderer with the scene loaded and answers two
//! actions: `FileInfo` prints one `$`-prefixed line per queried scene
//! property, and `GetResults` pulls finished frames for a job. Queries are
//! a closed, enumerated property set mapped to fixed accessors - the shim
//! never evaluates caller supplied text.

use crate::models::frame_range::FrameRange;

/// Scene properties the shim knows how to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneProperty {
    FrameStart,
    FrameEnd,
    ResolutionX,
    ResolutionY,
    ResolutionPercentage,
    OutputPath,
}

impl SceneProperty {
    /// Stable query name, the only thing that crosses the process
    /// boundary.
    pub fn query(&self) -> &'static str {
        match self {
            SceneProperty::FrameStart => "frame_start",
            SceneProperty::FrameEnd => "frame_end",
            SceneProperty::ResolutionX => "resolution_x",
            SceneProperty::ResolutionY => "resolution_y",
            SceneProperty::ResolutionPercentage => "resolution_percentage",
            SceneProperty::OutputPath => "output_path",
        }
    }
}

/// A literal value read back from a `$` line.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

fn parse_literal(text: &str) -> PropertyValue {
    match text {
        "True" | "true" => return PropertyValue::Bool(true),
        "False" | "false" => return PropertyValue::Bool(false),
        _ => {}
    }
    if let Ok(value) = text.parse::<i64>() {
        return PropertyValue::Int(value);
    }
    if let Ok(value) = text.parse::<f64>() {
        return PropertyValue::Float(value);
    }
    let unquoted = text
        .strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
        .or_else(|| text.strip_prefix('"').and_then(|t| t.strip_suffix('"')))
        .unwrap_or(text);
    PropertyValue::Text(unquoted.to_owned())
}

/// Collect the `$`-prefixed answer lines of a `FileInfo` run, in query
/// order. Everything else on stdout (render chatter, warnings) is ignored.
pub fn parse_output(stdout: &str) -> Vec<PropertyValue> {
    stdout
        .lines()
        .filter_map(|line| line.strip_prefix('$'))
        .map(|rest| parse_literal(rest.trim()))
        .collect()
}

/// Trailing shim arguments for a `FileInfo` run.
pub fn file_info_args(properties: &[SceneProperty]) -> Vec<String> {
    let mut args = vec!["--".to_owned(), "FileInfo".to_owned()];
    args.extend(properties.iter().map(|p| p.query().to_owned()));
    args
}

/// Output resolution triple forwarded to `GetResults`.
#[derive(Debug, Clone, Copy)]
pub struct Resolution {
    pub x: u32,
    pub y: u32,
    pub percentage: u32,
}

/// Full shim argument tail for a `GetResults` run: frame range flags first
/// (they must precede the action separator), then the action and its
/// parameters.
pub fn results_args(
    ranges: &[FrameRange],
    server_address: &str,
    server_port: u16,
    job_id: &str,
    resolution: Resolution,
) -> Vec<String> {
    let mut args: Vec<String> = ranges.iter().flat_map(|range| range.to_args()).collect();
    args.extend([
        "--".to_owned(),
        "GetResults".to_owned(),
        server_address.to_owned(),
        server_port.to_string(),
        job_id.to_owned(),
        resolution.x.to_string(),
        resolution.y.to_string(),
        resolution.percentage.to_string(),
    ]);
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_parse_as_literals_only() {
        let stdout = "\
Read blend: /tmp/scene.blend
$ 1
$ 250
$ 'render/output'
$ True
Saved session recovery
$ 1.5
";
        let values = parse_output(stdout);
        assert_eq!(
            values,
            vec![
                PropertyValue::Int(1),
                PropertyValue::Int(250),
                PropertyValue::Text("render/output".to_owned()),
                PropertyValue::Bool(true),
                PropertyValue::Float(1.5),
            ]
        );
    }

    #[test]
    fn unquoted_text_stays_text() {
        assert_eq!(
            parse_literal("not a number"),
            PropertyValue::Text("not a number".to_owned())
        );
    }

    #[test]
    fn file_info_args_carry_only_known_queries() {
        let args = file_info_args(&[SceneProperty::FrameStart, SceneProperty::ResolutionX]);
        assert_eq!(args, vec!["--", "FileInfo", "frame_start", "resolution_x"]);
    }

    #[test]
    fn results_args_put_frame_flags_before_the_action() {
        let args = results_args(
            &[FrameRange::Section { start: 1, end: 3 }, FrameRange::Single(10)],
            "192.168.1.10",
            8000,
            "job-1",
            Resolution {
                x: 1920,
                y: 1080,
                percentage: 50,
            },
        );
        assert_eq!(
            args,
            vec![
                "-s", "1", "-e", "3", "-a", "-f", "10", "--", "GetResults", "192.168.1.10",
                "8000", "job-1", "1920", "1080", "50"
            ]
        );
    }
}
