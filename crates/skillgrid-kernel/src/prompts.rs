//! Versioned prompt registry. Workers fetch the default template when
//! executing analysis jobs; reads are ungated so clients can display what
//! a report was produced from.

use skillgrid_core::{AnalysisPrompt, CoreError, Identity, Result};

use crate::{CoreState, Kernel};

pub(crate) const DEFAULT_PROMPT_ID: &str = "default-v1";
const DEFAULT_PROMPT_VERSION: &str = "1.0.0";

const DEFAULT_PROMPT_TEMPLATE: &str = r#"Analyze this agent skill and return your evaluation as JSON.

SKILL: {owner}/{repo}
NAME: {name}
DESCRIPTION: {description}

CONTENT:
{content}
{files}

Rate the skill on each topic (0-100):
Quality, Documentation, Maintainability, Completeness, Security,
Malicious (100 = completely safe, 0 = definitely malicious), Privacy,
Usability, Compatibility, Performance, Trustworthiness, Maintenance,
Community.

Also determine:
1. Whether the skill PROVIDES an MCP server (provides_mcp).
2. Which MCPs it REQUIRES (required_mcps), each with its own ratings.
3. Software dependencies (software_deps), each with its own ratings.
4. Referenced files: any file the skill expects the agent to read
   (companion docs, backtick references, "see X.md" instructions).
5. Referenced URLs: any link the skill tells the agent to visit.

Return only valid JSON with this shape:
{{
  "ratings": {{"overall": <0.0-5.0>, "topics": [{{"topic": "<Topic>", "score": <0-100>, "confidence": <0-100>, "reasoning": "<brief>"}}], "flags": [{{"flag_type": "<SecurityRisk|MaliciousPattern|PrivacyConcern|Unmaintained|Deprecated|ExcessivePermissions|UnverifiedSource|KnownVulnerability>", "severity": "<Info|Warning|Critical>", "message": "<description>"}}]}},
  "primary_category": "<web|programming|systems|blockchain|ai|devops|data|security|productivity|meta>",
  "secondary_categories": [], "tags": [],
  "has_mcp": <bool>, "provides_mcp": <bool>,
  "required_mcps": [], "software_deps": [],
  "has_references": <bool>, "has_assets": <bool>,
  "estimated_token_usage": <int>,
  "summary": "<2-3 sentences>", "strengths": [], "weaknesses": [],
  "use_cases": [], "compatibility_notes": "<string>", "prerequisites": [],
  "referenced_files": [{{"path": "<file>", "context": "<why>", "resolved": false}}],
  "referenced_urls": [{{"url": "<https://...>", "context": "<what for>", "fetched": false}}]
}}

Flag every security concern, even minor ones, and stay conservative with
trust scores for unknown sources."#;

/// Seed the built-in default on first start so the registry never begins
/// empty.
pub(crate) fn seed_default_prompt(state: &mut CoreState) {
    if !state.prompts.is_empty() {
        return;
    }
    let now = chrono::Utc::now();
    state.prompts.insert(
        DEFAULT_PROMPT_ID.to_string(),
        AnalysisPrompt {
            id: DEFAULT_PROMPT_ID.to_string(),
            name: "Default Analysis Prompt".to_string(),
            version: DEFAULT_PROMPT_VERSION.to_string(),
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            created_by: Identity::from("system"),
            created_at: now,
            is_default: true,
        },
    );
}

impl Kernel {
    pub fn create_prompt(
        &self,
        caller: &Identity,
        name: String,
        version: String,
        prompt_template: String,
    ) -> Result<String> {
        let mut state = self.state();
        state.require_admin(caller)?;
        let id = uuid::Uuid::new_v4().to_string();
        state.prompts.insert(
            id.clone(),
            AnalysisPrompt {
                id: id.clone(),
                name,
                version,
                prompt_template,
                created_by: caller.clone(),
                created_at: Self::now(),
                is_default: false,
            },
        );
        Ok(id)
    }

    /// Flip the default flag atomically: the previous default loses it in
    /// the same operation.
    pub fn set_default_prompt(&self, caller: &Identity, prompt_id: &str) -> Result<()> {
        let mut state = self.state();
        state.require_admin(caller)?;
        if !state.prompts.contains_key(prompt_id) {
            return Err(CoreError::not_found(format!(
                "prompt not found: {prompt_id}"
            )));
        }
        for prompt in state.prompts.values_mut() {
            prompt.is_default = prompt.id == prompt_id;
        }
        Ok(())
    }

    pub fn delete_prompt(&self, caller: &Identity, prompt_id: &str) -> Result<()> {
        let mut state = self.state();
        state.require_admin(caller)?;
        let prompt = state
            .prompts
            .get(prompt_id)
            .ok_or_else(|| CoreError::not_found(format!("prompt not found: {prompt_id}")))?;
        if prompt.is_default {
            return Err(CoreError::conflict(
                "cannot delete the default prompt; set another default first",
            ));
        }
        state.prompts.remove(prompt_id);
        Ok(())
    }

    pub fn get_prompt(&self, prompt_id: &str) -> Option<AnalysisPrompt> {
        self.state().prompts.get(prompt_id).cloned()
    }

    pub fn list_prompts(&self) -> Vec<AnalysisPrompt> {
        let state = self.state();
        let mut prompts: Vec<AnalysisPrompt> = state.prompts.values().cloned().collect();
        prompts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        prompts
    }

    pub fn get_default_prompt(&self) -> Option<AnalysisPrompt> {
        self.state()
            .prompts
            .values()
            .find(|p| p.is_default)
            .cloned()
    }
}
