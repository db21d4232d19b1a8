use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use clap::ValueEnum;
use clipforge::playback::{ActiveSource, Capability};
use clipforge::{ImprovedPrompt, Job, JobPage, JobStatus};
#[cfg(feature = "colored-output")]
use colored::*;
use cuetrack::{CueTrack, PreviewState, format_timestamp};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Human readable text
    #[default]
    Pretty,
    /// Indented JSON
    Json,
    /// Single-line JSON
    JsonCompact,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        matches!(self, Self::Json | Self::JsonCompact)
    }
}

pub struct OutputManager {
    colored: bool,
    format: OutputFormat,
}

impl OutputManager {
    pub fn new(colored: bool, format: OutputFormat) -> Self {
        Self { colored, format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn json<T: Serialize>(&self, value: &T) -> Result<String> {
        match self.format {
            OutputFormat::JsonCompact => serde_json::to_string(value),
            _ => serde_json::to_string_pretty(value),
        }
        .map_err(Into::into)
    }

    pub fn format_job(&self, job: &Job) -> Result<String> {
        if self.format.is_json() {
            return self.json(job);
        }
        let mut output = String::new();
        let _ = writeln!(
            output,
            "{} {}",
            self.colorize("Job", &Color::Green, true),
            self.colorize(&job.id, &Color::Cyan, false)
        );
        let _ = writeln!(output, "  {}: {}", self.label("Status"), self.status(job.status));
        let _ = writeln!(output, "  {}: {:.0}%", self.label("Progress"), job.progress);
        if let Some(prompt) = &job.prompt {
            let _ = writeln!(output, "  {}: {}", self.label("Prompt"), prompt);
        }
        for (name, url) in [
            ("Video", &job.progressive_url),
            ("Stream", &job.manifest_url),
            ("Thumbnails", &job.cue_track_url),
        ] {
            if let Some(url) = url {
                let _ = writeln!(
                    output,
                    "  {}: {}",
                    self.label(name),
                    self.colorize(url, &Color::Blue, false)
                );
            }
        }
        if let Some(error) = &job.error_message {
            let _ = writeln!(
                output,
                "  {}: {}",
                self.label("Error"),
                self.colorize(error, &Color::Red, false)
            );
        }
        Ok(output.trim_end().to_owned())
    }

    pub fn format_page(
        &self,
        page: &JobPage,
        posters: Option<&HashMap<String, Arc<str>>>,
    ) -> Result<String> {
        if self.format.is_json() {
            let items: Vec<serde_json::Value> = page
                .items
                .iter()
                .map(|job| {
                    let mut value = serde_json::to_value(job)?;
                    if let (Some(posters), Some(map)) = (posters, value.as_object_mut()) {
                        let poster = posters.get(&job.id).map(|p| p.to_string());
                        map.insert("poster".into(), poster.into());
                    }
                    Ok(value)
                })
                .collect::<std::result::Result<_, serde_json::Error>>()?;
            return self.json(&serde_json::json!({
                "page": page.page,
                "per_page": page.per_page,
                "total": page.total,
                "items": items,
            }));
        }

        let mut output = String::new();
        let header = match page.total {
            Some(total) => format!("Page {} ({} videos)", page.page, total),
            None => format!("Page {}", page.page),
        };
        let _ = writeln!(output, "{}", self.colorize(&header, &Color::Green, true));
        if page.items.is_empty() {
            let _ = writeln!(output, "  (no videos)");
        }
        for job in &page.items {
            let prompt = job.prompt.as_deref().unwrap_or("");
            let _ = writeln!(
                output,
                "  {}  {}  {}",
                self.colorize(&job.id, &Color::Cyan, false),
                self.status(job.status),
                truncate(prompt, 60)
            );
            if let Some(poster) = posters.and_then(|p| p.get(&job.id)) {
                let _ = writeln!(
                    output,
                    "      {}: {}",
                    self.label("Poster"),
                    self.colorize(poster, &Color::Blue, false)
                );
            }
        }
        Ok(output.trim_end().to_owned())
    }

    pub fn format_improved(&self, improved: &ImprovedPrompt) -> Result<String> {
        if self.format.is_json() {
            return self.json(improved);
        }
        let mut output = String::new();
        let _ = writeln!(output, "{}", self.colorize("Improved prompt:", &Color::Green, true));
        let _ = writeln!(output, "  {}", improved.auto_improved);
        for (i, variant) in improved.variants.iter().enumerate() {
            let _ = writeln!(
                output,
                "{}",
                self.colorize(&format!("Variant {}:", i + 1), &Color::Green, true)
            );
            let _ = writeln!(output, "  {}: {}", self.label("Concise"), variant.concise);
            let _ = writeln!(output, "  {}: {}", self.label("Expanded"), variant.expanded);
        }
        Ok(output.trim_end().to_owned())
    }

    pub fn format_composed(&self, composed: &str) -> Result<String> {
        if self.format.is_json() {
            return self.json(&serde_json::json!({ "composed": composed }));
        }
        Ok(composed.to_owned())
    }

    pub fn format_track(&self, track: &CueTrack) -> Result<String> {
        if self.format.is_json() {
            return self.json(track);
        }
        if track.is_empty() {
            return Ok("No thumbnails available".to_owned());
        }
        let mut output = String::new();
        let _ = writeln!(
            output,
            "{}",
            self.colorize(
                &format!("{} thumbnails, {:.3}s", track.len(), track.span()),
                &Color::Green,
                true
            )
        );
        for cue in track {
            let _ = writeln!(
                output,
                "  {} --> {}  {}",
                format_timestamp(cue.start),
                format_timestamp(cue.end),
                self.colorize(&cue.image, &Color::Blue, false)
            );
        }
        Ok(output.trim_end().to_owned())
    }

    pub fn format_preview(&self, time: f64, preview: &PreviewState) -> Result<String> {
        if self.format.is_json() {
            return self.json(&serde_json::json!({ "time": time, "preview": preview }));
        }
        let at = format_timestamp(time);
        match (&preview.image, preview.visible) {
            (Some(image), true) => Ok(format!(
                "{} {}\n  {}: ({:.1}, {:.1})",
                self.label(&at),
                self.colorize(image, &Color::Blue, false),
                self.label("Popup"),
                preview.x,
                preview.y
            )),
            _ => Ok(format!("{} no thumbnail", self.label(&at))),
        }
    }

    pub fn format_source(&self, capability: Capability, active: &ActiveSource) -> Result<String> {
        if self.format.is_json() {
            return self.json(&serde_json::json!({
                "capability": format!("{capability:?}"),
                "source": active,
            }));
        }
        Ok(match active.url() {
            Some(url) => format!(
                "{}: {}\n  {}",
                self.label("Source"),
                self.colorize(active.kind(), &Color::Cyan, true),
                self.colorize(url, &Color::Blue, false)
            ),
            None => format!("{}: none", self.label("Source")),
        })
    }

    pub fn format_progress(&self, job: &Job) -> String {
        match job.status {
            JobStatus::Queued => "queued".to_owned(),
            JobStatus::Processing => format!("processing {:.0}%", job.progress),
            JobStatus::Done => "done".to_owned(),
            JobStatus::Error => format!(
                "error: {}",
                job.error_message.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    fn label(&self, text: &str) -> String {
        self.colorize(text, &Color::Yellow, false)
    }

    fn status(&self, status: JobStatus) -> String {
        let color = match status {
            JobStatus::Done => Color::Green,
            JobStatus::Error => Color::Red,
            JobStatus::Queued | JobStatus::Processing => Color::Cyan,
        };
        self.colorize(status.as_str(), &color, false)
    }

    fn colorize(&self, text: &str, color: &Color, bold: bool) -> String {
        #[cfg(feature = "colored-output")]
        {
            if self.colored {
                let colored_text = match color {
                    Color::Green => text.green(),
                    Color::Yellow => text.yellow(),
                    Color::Blue => text.blue(),
                    Color::Cyan => text.cyan(),
                    Color::Red => text.red(),
                };
                if bold {
                    colored_text.bold().to_string()
                } else {
                    colored_text.to_string()
                }
            } else {
                text.to_string()
            }
        }

        #[cfg(not(feature = "colored-output"))]
        {
            let _ = (color, bold, self.colored);
            text.to_string()
        }
    }
}

enum Color {
    Green,
    Yellow,
    Blue,
    Cyan,
    Red,
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}
