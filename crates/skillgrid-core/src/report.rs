//! Parsing of worker-submitted analysis reports.
//!
//! Workers return a JSON document, sometimes wrapped in prose; the parser
//! slices out the outermost object, deserializes a raw shape with
//! string-typed tags, and converts with strict enum mapping. Unknown tags
//! and missing or mistyped required fields are `InvalidArgument`. The
//! variant sets are closed and the boundary rejects anything outside them.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::analysis::{
    FlagSeverity, FlagType, McpDependency, RatingFlag, RatingTopic, Ratings, ReferencedFile,
    ReferencedUrl, SkillAnalysis, SoftwareDependency, TopicRating,
};
use crate::auth::Identity;
use crate::error::{CoreError, Result};

/// Schema version stamped on every report parsed by this build.
pub const ANALYSIS_VERSION: &str = "3.0.0";

#[derive(Deserialize)]
struct RawTopicRating {
    topic: String,
    score: u8,
    confidence: u8,
    reasoning: String,
}

#[derive(Deserialize)]
struct RawFlag {
    flag_type: String,
    severity: String,
    message: String,
}

#[derive(Deserialize)]
struct RawRatings {
    overall: f32,
    topics: Vec<RawTopicRating>,
    #[serde(default)]
    flags: Vec<RawFlag>,
}

#[derive(Deserialize)]
struct RawMcpDep {
    name: String,
    package: String,
    required: bool,
    #[serde(default)]
    ratings: Option<RawRatings>,
}

#[derive(Deserialize)]
struct RawSoftwareDep {
    name: String,
    #[serde(default)]
    install_cmd: Option<String>,
    #[serde(default)]
    url: Option<String>,
    required: bool,
    #[serde(default)]
    ratings: Option<RawRatings>,
}

#[derive(Deserialize)]
struct RawReferencedFile {
    path: String,
    context: String,
    #[serde(default)]
    resolved: bool,
}

#[derive(Deserialize)]
struct RawReferencedUrl {
    url: String,
    context: String,
    #[serde(default)]
    fetched: bool,
}

#[derive(Deserialize)]
struct RawReport {
    ratings: RawRatings,
    primary_category: String,
    secondary_categories: Vec<String>,
    tags: Vec<String>,
    has_mcp: bool,
    #[serde(default)]
    provides_mcp: bool,
    #[serde(default)]
    required_mcps: Vec<RawMcpDep>,
    #[serde(default)]
    software_deps: Vec<RawSoftwareDep>,
    has_references: bool,
    has_assets: bool,
    estimated_token_usage: u32,
    summary: String,
    strengths: Vec<String>,
    weaknesses: Vec<String>,
    use_cases: Vec<String>,
    compatibility_notes: String,
    prerequisites: Vec<String>,
    #[serde(default)]
    referenced_files: Vec<RawReferencedFile>,
    #[serde(default)]
    referenced_urls: Vec<RawReferencedUrl>,
}

fn convert_ratings(raw: RawRatings) -> Result<Ratings> {
    let topics = raw
        .topics
        .into_iter()
        .map(|t| {
            Ok(TopicRating {
                topic: RatingTopic::parse(&t.topic)?,
                score: t.score.min(100),
                confidence: t.confidence.min(100),
                reasoning: t.reasoning,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let flags = raw
        .flags
        .into_iter()
        .map(|f| {
            Ok(RatingFlag {
                flag_type: FlagType::parse(&f.flag_type)?,
                severity: FlagSeverity::parse(&f.severity)?,
                message: f.message,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Ratings {
        overall: raw.overall.clamp(0.0, 5.0),
        topics,
        flags,
    })
}

/// Slice out the outermost JSON object so a report wrapped in prose still
/// parses.
fn json_slice(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

/// Parse a worker report into a `SkillAnalysis` attributed to the job's
/// requester. TEE and prompt provenance are attached by the caller when the
/// worker supplied them.
pub fn parse_analysis_report(
    text: &str,
    model: &str,
    requester: &Identity,
    now: DateTime<Utc>,
) -> Result<SkillAnalysis> {
    let raw: RawReport = serde_json::from_str(json_slice(text))
        .map_err(|e| CoreError::invalid(format!("malformed analysis report: {e}")))?;

    Ok(SkillAnalysis {
        ratings: convert_ratings(raw.ratings)?,
        primary_category: raw.primary_category,
        secondary_categories: raw.secondary_categories,
        tags: raw.tags,
        has_mcp: raw.has_mcp,
        provides_mcp: raw.provides_mcp,
        required_mcps: raw
            .required_mcps
            .into_iter()
            .map(|m| {
                Ok(McpDependency {
                    name: m.name,
                    package: m.package,
                    required: m.required,
                    indexed: false,
                    verified: false,
                    ratings: m.ratings.map(convert_ratings).transpose()?,
                })
            })
            .collect::<Result<Vec<_>>>()?,
        software_deps: raw
            .software_deps
            .into_iter()
            .map(|s| {
                Ok(SoftwareDependency {
                    name: s.name,
                    install_cmd: s.install_cmd,
                    url: s.url,
                    required: s.required,
                    ratings: s.ratings.map(convert_ratings).transpose()?,
                })
            })
            .collect::<Result<Vec<_>>>()?,
        has_references: raw.has_references,
        has_assets: raw.has_assets,
        estimated_token_usage: raw.estimated_token_usage,
        summary: raw.summary,
        strengths: raw.strengths,
        weaknesses: raw.weaknesses,
        use_cases: raw.use_cases,
        compatibility_notes: raw.compatibility_notes,
        prerequisites: raw.prerequisites,
        referenced_files: raw
            .referenced_files
            .into_iter()
            .map(|f| ReferencedFile {
                path: f.path,
                context: f.context,
                resolved: f.resolved,
            })
            .collect(),
        referenced_urls: raw
            .referenced_urls
            .into_iter()
            .map(|u| ReferencedUrl {
                url: u.url,
                context: u.context,
                fetched: u.fetched,
            })
            .collect(),
        analyzed_at: now,
        analyzed_by: requester.clone(),
        model_used: model.to_string(),
        analysis_version: ANALYSIS_VERSION.to_string(),
        tee_worker_version: None,
        prompt_version: None,
    })
}
