//! Image-generation requests and a simulated executor for them.

use crate::error::ExecutionError;
use crate::executor::{Executor, ProgressReporter};
use async_trait::async_trait;
use lexigraph_config::GenerationDefaults;
use lexigraph_core::rules::{multiple_of_eight, not_blank};
use lexigraph_core::{LexigraphError, LexigraphResult, ValidateExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;
use validator::Validate;

/// Negative prompt used when neither the request nor its style provides one.
pub const DEFAULT_NEGATIVE_PROMPT: &str = "low quality, blurry, distorted";

/// Diffusion sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sampler {
    #[default]
    Ddim,
    Dpm,
    Euler,
    EulerA,
}

impl Sampler {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ddim => "ddim",
            Self::Dpm => "dpm",
            Self::Euler => "euler",
            Self::EulerA => "euler_a",
        }
    }
}

impl fmt::Display for Sampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sampler {
    type Err = LexigraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ddim" => Ok(Self::Ddim),
            "dpm" => Ok(Self::Dpm),
            "euler" => Ok(Self::Euler),
            "euler_a" => Ok(Self::EulerA),
            other => Err(LexigraphError::validation(format!(
                "unknown sampler '{other}', expected one of ddim, dpm, euler, euler_a"
            ))),
        }
    }
}

/// Style preset appended to the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StylePreset {
    Realistic,
    Artistic,
    Anime,
    Portrait,
    Landscape,
}

impl StylePreset {
    pub const ALL: [StylePreset; 5] = [
        Self::Realistic,
        Self::Artistic,
        Self::Anime,
        Self::Portrait,
        Self::Landscape,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Realistic => "realistic",
            Self::Artistic => "artistic",
            Self::Anime => "anime",
            Self::Portrait => "portrait",
            Self::Landscape => "landscape",
        }
    }

    pub fn positive_suffix(self) -> &'static str {
        match self {
            Self::Realistic => ", photorealistic, high quality, detailed",
            Self::Artistic => ", artistic, creative, beautiful composition",
            Self::Anime => ", anime style, manga, detailed anime art",
            Self::Portrait => ", portrait photography, professional lighting, high detail",
            Self::Landscape => ", landscape photography, scenic, beautiful vista",
        }
    }

    pub fn negative_prompt(self) -> &'static str {
        match self {
            Self::Realistic => "cartoon, anime, painting, drawing, low quality, blurry",
            Self::Artistic => "low quality, blurry, distorted",
            Self::Anime => "realistic, photographic, low quality",
            Self::Portrait => "low quality, blurry, distorted face, multiple people",
            Self::Landscape => "people, portraits, low quality, blurry",
        }
    }
}

impl FromStr for StylePreset {
    type Err = LexigraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.as_str() == s)
            .ok_or_else(|| LexigraphError::validation(format!("unknown style preset '{s}'")))
    }
}

/// Parameters for one image generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct GenerationRequest {
    #[validate(length(min = 1, max = 500), custom(function = "not_blank"))]
    pub prompt: String,

    #[validate(length(max = 500))]
    pub negative_prompt: Option<String>,

    #[validate(range(min = 64, max = 1024), custom(function = "multiple_of_eight"))]
    pub width: u32,

    #[validate(range(min = 64, max = 1024), custom(function = "multiple_of_eight"))]
    pub height: u32,

    #[validate(range(min = 1, max = 100))]
    pub steps: u32,

    #[validate(range(min = 1.0, max = 20.0))]
    pub guidance_scale: f32,

    pub seed: Option<u32>,

    pub style: Option<StylePreset>,

    #[serde(default)]
    pub sampler: Sampler,
}

impl GenerationRequest {
    /// Creates a 512x512, 20-step request.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self::from_defaults(prompt, &GenerationDefaults::default())
    }

    /// Creates a request using configured defaults.
    pub fn from_defaults(prompt: impl Into<String>, defaults: &GenerationDefaults) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            width: defaults.default_width,
            height: defaults.default_height,
            steps: defaults.default_steps,
            guidance_scale: defaults.default_guidance_scale,
            seed: None,
            style: None,
            sampler: Sampler::default(),
        }
    }

    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    #[must_use]
    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }

    #[must_use]
    pub fn with_guidance_scale(mut self, guidance_scale: f32) -> Self {
        self.guidance_scale = guidance_scale;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn with_style(mut self, style: StylePreset) -> Self {
        self.style = Some(style);
        self
    }

    #[must_use]
    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative_prompt.into());
        self
    }

    #[must_use]
    pub fn with_sampler(mut self, sampler: Sampler) -> Self {
        self.sampler = sampler;
        self
    }

    /// Prompt with the style suffix applied.
    pub fn effective_prompt(&self) -> String {
        match self.style {
            Some(style) => format!("{}{}", self.prompt, style.positive_suffix()),
            None => self.prompt.clone(),
        }
    }

    /// Explicit negative prompt, else the style's, else the default.
    pub fn effective_negative_prompt(&self) -> &str {
        self.negative_prompt
            .as_deref()
            .or_else(|| self.style.map(StylePreset::negative_prompt))
            .unwrap_or(DEFAULT_NEGATIVE_PROMPT)
    }

    /// Validates the request against static rules and the configured limits.
    pub fn check(&self, limits: &GenerationDefaults) -> LexigraphResult<()> {
        self.validate_request()?;

        let mut problems = Vec::new();
        if self.prompt.chars().count() > limits.max_prompt_length {
            problems.push(format!(
                "prompt: longer than {} characters",
                limits.max_prompt_length
            ));
        }
        if self.width > limits.max_width {
            problems.push(format!("width: exceeds {}", limits.max_width));
        }
        if self.height > limits.max_height {
            problems.push(format!("height: exceeds {}", limits.max_height));
        }
        if self.steps > limits.max_steps {
            problems.push(format!("steps: exceeds {}", limits.max_steps));
        }
        if self.guidance_scale > limits.max_guidance_scale {
            problems.push(format!(
                "guidance_scale: exceeds {}",
                limits.max_guidance_scale
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(LexigraphError::Validation(problems.join("; ")))
        }
    }

    /// Explicit seed, or one derived from the prompt.
    #[allow(clippy::cast_possible_truncation)]
    pub fn resolved_seed(&self) -> u32 {
        self.seed.unwrap_or_else(|| {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            self.prompt.hash(&mut hasher);
            hasher.finish() as u32
        })
    }
}

/// Result of a successful generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutput {
    /// Reference to the stored image.
    pub image_id: String,
    pub seed: u32,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub elapsed: Duration,
}

/// Executor that imitates a diffusion pipeline by sleeping once per step.
///
/// Useful for demos and load tests. Honors cancellation between steps.
pub struct SimulatedExecutor {
    step_delay: Duration,
    fail_every: Option<u64>,
    calls: AtomicU64,
}

impl SimulatedExecutor {
    pub fn new(step_delay: Duration) -> Self {
        Self {
            step_delay,
            fail_every: None,
            calls: AtomicU64::new(0),
        }
    }

    /// Makes every `n`-th call fail halfway through with a retryable error.
    #[must_use]
    pub fn with_failure_every(mut self, n: u64) -> Self {
        self.fail_every = (n > 0).then_some(n);
        self
    }

    /// Number of calls started so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Executor for SimulatedExecutor {
    type Request = GenerationRequest;
    type Output = GenerationOutput;

    async fn execute(
        &self,
        request: GenerationRequest,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<GenerationOutput, ExecutionError> {
        request
            .validate_request()
            .map_err(|e| ExecutionError::rejected(e.to_string()))?;

        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        let fail_at = self
            .fail_every
            .filter(|n| call % n == 0)
            .map(|_| (request.steps / 2).max(1));
        let started = Instant::now();

        debug!(
            job_id = %progress.job_id(),
            prompt = %request.effective_prompt(),
            sampler = %request.sampler,
            steps = request.steps,
            "Simulating generation"
        );

        for step in 1..=request.steps {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ExecutionError::Cancelled),
                () = tokio::time::sleep(self.step_delay) => {}
            }

            if fail_at == Some(step) {
                return Err(ExecutionError::failed(format!(
                    "sampler diverged at step {step}/{}",
                    request.steps
                )));
            }
            progress.report_steps(step, request.steps);
        }

        Ok(GenerationOutput {
            image_id: format!("img-{}", Uuid::new_v4().simple()),
            seed: request.resolved_seed(),
            width: request.width,
            height: request.height,
            steps: request.steps,
            elapsed: started.elapsed(),
        })
    }
}
