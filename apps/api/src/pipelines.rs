//! Built-in job handlers, registered once at startup. Each handler owns
//! its own progress/completion reporting and reaches external services
//! exclusively through the gateway.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::gateway::ServiceGateway;
use crate::jobs::model::Job;
use crate::jobs::registry::{HandlerRegistry, JobHandler};
use crate::jobs::store::JobStore;
use crate::services::llm::{strip_json_fences, LlmClient};
use crate::services::scraper::ScraperClient;

const DEFAULT_SYSTEM: &str =
    "You are an expert career writer. Follow the user's instructions exactly \
     and return only the requested document.";

fn parse_input<T: DeserializeOwned>(job: &Job) -> Result<T> {
    serde_json::from_value(job.input_data.clone().unwrap_or(Value::Null))
        .with_context(|| format!("invalid input for job type '{}'", job.job_type))
}

/// Registers every job type this deployment processes.
pub fn register_all(
    registry: &mut HandlerRegistry,
    gateway: Arc<ServiceGateway>,
    llm: Arc<LlmClient>,
    scraper: Arc<ScraperClient>,
) -> Result<()> {
    registry.register(
        "company_research",
        Arc::new(CompanyResearchHandler {
            gateway: gateway.clone(),
            scraper: scraper.clone(),
        }),
    )?;
    registry.register(
        "cover_letter",
        Arc::new(CoverLetterHandler {
            gateway: gateway.clone(),
            llm: llm.clone(),
        }),
    )?;
    registry.register(
        "tailor_resume",
        Arc::new(TailorResumeHandler {
            gateway,
            llm,
            scraper,
        }),
    )?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct CompanyResearchInput {
    url: String,
}

/// Scrapes a company page into markdown research notes.
struct CompanyResearchHandler {
    gateway: Arc<ServiceGateway>,
    scraper: Arc<ScraperClient>,
}

#[async_trait]
impl JobHandler for CompanyResearchHandler {
    async fn run(&self, store: Arc<dyn JobStore>, job: Job) -> Result<()> {
        let input: CompanyResearchInput = parse_input(&job)?;

        store
            .update_progress(job.id, 10, "Scraping company site")
            .await?;
        let page = self
            .gateway
            .execute("firecrawl", || self.scraper.scrape(&input.url))
            .await?;

        store
            .update_progress(job.id, 80, "Preparing research notes")
            .await?;
        let title = page.metadata.as_ref().and_then(|m| m.title.clone());
        store
            .complete_job(
                job.id,
                json!({
                    "url": input.url,
                    "title": title,
                    "markdown": page.markdown,
                }),
            )
            .await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct CoverLetterInput {
    prompt: String,
    #[serde(default)]
    system: Option<String>,
}

/// Drafts a cover letter from a producer-built prompt.
struct CoverLetterHandler {
    gateway: Arc<ServiceGateway>,
    llm: Arc<LlmClient>,
}

#[async_trait]
impl JobHandler for CoverLetterHandler {
    async fn run(&self, store: Arc<dyn JobStore>, job: Job) -> Result<()> {
        let input: CoverLetterInput = parse_input(&job)?;
        let system = input.system.as_deref().unwrap_or(DEFAULT_SYSTEM);

        store
            .update_progress(job.id, 10, "Drafting cover letter")
            .await?;
        let content = self
            .gateway
            .execute("anthropic", || self.llm.complete(system, &input.prompt))
            .await?;

        store.update_progress(job.id, 90, "Finalizing").await?;
        store
            .complete_job(job.id, json!({ "content": content }))
            .await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TailorResumeInput {
    prompt: String,
    #[serde(default)]
    system: Option<String>,
    /// Optional job-posting URL; when present it is scraped and appended
    /// to the prompt so the model tailors against the live posting.
    #[serde(default)]
    job_url: Option<String>,
}

/// Tailors a resume against a job posting; expects the model to return
/// the tailored resume as JSON.
struct TailorResumeHandler {
    gateway: Arc<ServiceGateway>,
    llm: Arc<LlmClient>,
    scraper: Arc<ScraperClient>,
}

#[async_trait]
impl JobHandler for TailorResumeHandler {
    async fn run(&self, store: Arc<dyn JobStore>, job: Job) -> Result<()> {
        let input: TailorResumeInput = parse_input(&job)?;
        let system = input.system.as_deref().unwrap_or(DEFAULT_SYSTEM);
        let mut prompt = input.prompt.clone();

        if let Some(job_url) = &input.job_url {
            store
                .update_progress(job.id, 10, "Fetching job posting")
                .await?;
            let page = self
                .gateway
                .execute("firecrawl", || self.scraper.scrape(job_url))
                .await?;
            prompt.push_str("\n\n# Job posting\n");
            prompt.push_str(&page.markdown);
        }

        store
            .update_progress(job.id, 40, "Tailoring resume")
            .await?;
        let raw = self
            .gateway
            .execute("anthropic", || self.llm.complete(system, &prompt))
            .await?;

        store
            .update_progress(job.id, 90, "Saving tailored resume")
            .await?;
        let resume: Value = serde_json::from_str(strip_json_fences(&raw))
            .context("LLM did not return valid resume JSON")?;
        store
            .complete_job(job.id, json!({ "resume": resume }))
            .await?;
        Ok(())
    }
}
