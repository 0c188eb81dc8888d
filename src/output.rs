//! Report writers. Each is a pure function of the report.

use clap::ValueEnum;
use serde::Serialize;
use std::io::{self, Write};

use crate::report::Report;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Plain,
    Csv,
    Yaml,
    Json,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Plain => "txt",
            OutputFormat::Csv => "csv",
            OutputFormat::Yaml => "yaml",
            OutputFormat::Json => "json",
        }
    }
}

pub fn write_report(format: OutputFormat, report: &Report, w: &mut dyn Write) -> io::Result<()> {
    match format {
        OutputFormat::Plain => write_plain(report, w),
        OutputFormat::Csv => write_csv(report, w),
        OutputFormat::Yaml => write_yaml(report, w),
        OutputFormat::Json => write_json(report, w),
    }
}

fn truncate_cell(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for c in s.chars().take(max.saturating_sub(1)) {
        out.push(c);
    }
    out.push('…');
    out
}

fn write_plain(report: &Report, w: &mut dyn Write) -> io::Result<()> {
    writeln!(
        w,
        "Most active GitHub users in {} by {}",
        report.title, report.parameters.metric
    )?;
    if let Some(preset) = &report.preset {
        writeln!(w, "preset: {} ({})", preset.name, preset.checksum)?;
    }
    writeln!(w, "generated: {}", report.generated_at_display())?;
    writeln!(w, "{:─<72}", "")?;
    for (i, u) in report.users.iter().enumerate() {
        let name = u
            .profile
            .name
            .as_deref()
            .map(|n| format!("({})", truncate_cell(n, 24)))
            .unwrap_or_default();
        let company = u
            .profile
            .company
            .as_deref()
            .map(|c| truncate_cell(c, 20))
            .unwrap_or_default();
        writeln!(
            w,
            "#{:<4} {:24} {:26} {:20} {:>8}",
            i + 1,
            u.profile.login,
            name,
            company,
            u.score
        )?;
    }
    writeln!(
        w,
        "\n{} shown, {} distinct users from {} sightings ({} excluded)",
        report.stats.returned,
        report.stats.distinct_users,
        report.stats.sightings,
        report.stats.excluded_sightings
    )
}

const CSV_HEADER: &str = "rank,login,name,company,avatar_url,followers,contributions,private_contributions,score,locations";

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn write_csv(report: &Report, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{CSV_HEADER}")?;
    for (i, u) in report.users.iter().enumerate() {
        let p = &u.profile;
        let locations = u.locations.iter().cloned().collect::<Vec<_>>().join(";");
        let fields = [
            (i + 1).to_string(),
            csv_field(&p.login),
            csv_field(p.name.as_deref().unwrap_or("")),
            csv_field(p.company.as_deref().unwrap_or("")),
            csv_field(p.avatar_url.as_deref().unwrap_or("")),
            p.followers.to_string(),
            p.contributions.to_string(),
            p.private_contributions.to_string(),
            u.score.to_string(),
            csv_field(&locations),
        ];
        writeln!(w, "{}", fields.join(","))?;
    }
    Ok(())
}

fn write_yaml(report: &Report, w: &mut dyn Write) -> io::Result<()> {
    serde_yaml::to_writer(w, report).map_err(io::Error::other)
}

#[derive(Serialize)]
struct JsonEnvelope<'a> {
    schema_version: u32,
    ok: bool,
    command: &'a str,
    #[serde(flatten)]
    report: &'a Report,
}

fn write_json(report: &Report, w: &mut dyn Write) -> io::Result<()> {
    let out = JsonEnvelope {
        schema_version: 1,
        ok: true,
        command: "rank",
        report,
    };
    serde_json::to_writer_pretty(&mut *w, &out).map_err(io::Error::other)?;
    writeln!(w)
}
