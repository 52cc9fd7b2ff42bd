use serde::{Deserialize, Serialize};

/// Frame selection handed to the renderer subprocess shim.
// ref: https://docs.blender.org/manual/en/latest/advanced/command_line/render.html
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameRange {
    /// Render one frame (`-f n`).
    Single(i32),
    /// Render an inclusive section (`-s a -e b -a`).
    Section { start: i32, end: i32 },
}

impl FrameRange {
    /// Renderer CLI arguments for this range. Section mode must end with
    /// `-a` so the start/end bounds take effect.
    pub fn to_args(&self) -> Vec<String> {
        match self {
            FrameRange::Single(frame) => vec!["-f".to_owned(), frame.to_string()],
            FrameRange::Section { start, end } => vec![
                "-s".to_owned(),
                start.to_string(),
                "-e".to_owned(),
                end.to_string(),
                "-a".to_owned(),
            ],
        }
    }

    /// Expand to the individual frame numbers for job submission.
    pub fn frames(&self) -> Vec<i32> {
        match self {
            FrameRange::Single(frame) => vec![*frame],
            FrameRange::Section { start, end } => (*start..=*end).collect(),
        }
    }
}
