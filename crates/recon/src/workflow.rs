//! Reconciliation workflow.
//!
//! [`transition`] is a pure state machine over [`WorkflowContext`]: it
//! applies one [`Event`] and may ask for one [`Effect`]. [`Workflow`] runs
//! effects (file parsing, AI calls, totals) and posts their completion
//! back as `*Done` events, so the context is only ever changed by
//! `transition`.

use std::fmt;
use std::path::PathBuf;

use ledgermatch_ai::Assistant;
use ledgermatch_config::{Credential, Settings};
use serde::Serialize;

use crate::assist::AiAccess;
use crate::error::ReconError;
use crate::ingest::Classification;
use crate::messages::{user_message, Locale};
use crate::model::{CategoryMap, ParsedData, Source};
use crate::pipeline::parse_files;
use crate::remote;
use crate::totals::{calculate, move_entry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Upload,
    Parse,
    Display,
    Classify,
    ManualConfirm,
    Calculate,
    Compare,
    Summarize,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Upload => "upload",
            Stage::Parse => "parse",
            Stage::Display => "display",
            Stage::Classify => "classify",
            Stage::ManualConfirm => "manual_confirm",
            Stage::Calculate => "calculate",
            Stage::Compare => "compare",
            Stage::Summarize => "summarize",
        }
    }

    /// Stages whose work goes through a remote call or file I/O
    pub fn is_network(&self) -> bool {
        matches!(self, Stage::Parse | Stage::Classify | Stage::Summarize)
    }

    /// Where `Back` leads; completed stages are not re-run.
    fn previous(&self) -> Option<Stage> {
        match self {
            Stage::Upload => None,
            Stage::Parse | Stage::Display => Some(Stage::Upload),
            Stage::Classify | Stage::ManualConfirm => Some(Stage::Display),
            Stage::Calculate | Stage::Compare => Some(Stage::ManualConfirm),
            Stage::Summarize => Some(Stage::Compare),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    SetFile(Source, PathBuf),
    SetCredential(String),
    Next,
    Back,
    Skip,
    MoveEntry {
        entry_id: String,
        from: String,
        to: String,
    },
    Retry,
    Restart,
    ParseDone(Result<ParsedData, ReconError>),
    ClassifyDone(Result<Classification, ReconError>),
    CalculateDone(CategoryMap),
    SummaryDone(Result<String, ReconError>),
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::SetFile(..) => "SetFile",
            Event::SetCredential(_) => "SetCredential",
            Event::Next => "Next",
            Event::Back => "Back",
            Event::Skip => "Skip",
            Event::MoveEntry { .. } => "MoveEntry",
            Event::Retry => "Retry",
            Event::Restart => "Restart",
            Event::ParseDone(_) => "ParseDone",
            Event::ClassifyDone(_) => "ClassifyDone",
            Event::CalculateDone(_) => "CalculateDone",
            Event::SummaryDone(_) => "SummaryDone",
        }
    }
}

/// Work requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    ParseFiles { standard: PathBuf, check: PathBuf },
    Classify,
    Calculate,
    Summarize,
}

/// All state of one reconciliation session.
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    pub standard_file: Option<PathBuf>,
    pub check_file: Option<PathBuf>,
    pub credential: Option<Credential>,
    pub parsed: Option<ParsedData>,
    pub categories: CategoryMap,
    pub summary: String,
    pub stage: Stage,
    pub error: Option<ReconError>,
    pub loading: bool,
    pub locale: Locale,
}

impl WorkflowContext {
    pub fn new(locale: Locale) -> Self {
        Self {
            standard_file: None,
            check_file: None,
            credential: None,
            parsed: None,
            categories: CategoryMap::new(),
            summary: String::new(),
            stage: Stage::Upload,
            error: None,
            loading: false,
            locale,
        }
    }

    /// Upload guard
    pub fn can_start(&self) -> bool {
        self.standard_file.is_some()
            && self.check_file.is_some()
            && self.credential.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Translated short message plus detail
    pub fn error_message(&self) -> Option<String> {
        self.error
            .as_ref()
            .map(|e| format!("{}: {}", user_message(e.kind(), self.locale), e))
    }

    fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        if stage.is_network() {
            self.loading = true;
            self.error = None;
        }
    }

    /// The effect that (re)runs the current network-backed stage
    fn stage_effect(&self) -> Option<Effect> {
        match self.stage {
            Stage::Parse => Some(Effect::ParseFiles {
                standard: self.standard_file.clone()?,
                check: self.check_file.clone()?,
            }),
            Stage::Classify => Some(Effect::Classify),
            Stage::Summarize => Some(Effect::Summarize),
            _ => None,
        }
    }

    fn fail(&mut self, error: ReconError) {
        log::warn!("{} failed: {}", self.stage, error);
        self.loading = false;
        self.error = Some(error);
    }
}

/// Apply one event. Events that do not apply to the current stage are ignored.
pub fn transition(ctx: &mut WorkflowContext, event: Event) -> Option<Effect> {
    let from = ctx.stage;
    let name = event.name();

    let effect = match (ctx.stage, event) {
        (Stage::Upload, Event::SetFile(source, path)) => {
            match source {
                Source::Standard => ctx.standard_file = Some(path),
                Source::Check => ctx.check_file = Some(path),
            }
            ctx.error = None;
            None
        }
        (Stage::Upload, Event::SetCredential(key)) => {
            ctx.credential = Some(Credential::new(key));
            None
        }
        (Stage::Upload, Event::Next) => {
            if !ctx.can_start() {
                log::debug!("upload guard: files or credential missing");
                return None;
            }
            ctx.enter(Stage::Parse);
            ctx.stage_effect()
        }
        (Stage::Parse, Event::ParseDone(result)) => {
            match result {
                Ok(parsed) => {
                    ctx.loading = false;
                    ctx.parsed = Some(parsed);
                    ctx.enter(Stage::Display);
                }
                Err(e) => ctx.fail(e),
            }
            None
        }
        (Stage::Display, Event::Next) => {
            ctx.enter(Stage::Classify);
            ctx.stage_effect()
        }
        (Stage::Classify, Event::ClassifyDone(result)) => {
            match result {
                Ok(classification) => {
                    ctx.loading = false;
                    ctx.categories = classification.categories;
                    ctx.summary = classification.summary;
                    ctx.enter(Stage::ManualConfirm);
                }
                Err(e) => ctx.fail(e),
            }
            None
        }
        (Stage::ManualConfirm, Event::MoveEntry { entry_id, from, to }) => {
            move_entry(&mut ctx.categories, &entry_id, &from, &to);
            None
        }
        (Stage::ManualConfirm, Event::Next | Event::Skip) => {
            ctx.enter(Stage::Calculate);
            Some(Effect::Calculate)
        }
        (Stage::Calculate, Event::CalculateDone(categories)) => {
            ctx.categories = categories;
            ctx.enter(Stage::Compare);
            None
        }
        (Stage::Compare, Event::Next) => {
            ctx.enter(Stage::Summarize);
            ctx.stage_effect()
        }
        (Stage::Summarize, Event::SummaryDone(result)) => {
            match result {
                Ok(summary) => {
                    ctx.loading = false;
                    ctx.summary = summary;
                }
                Err(e) => ctx.fail(e),
            }
            None
        }
        (Stage::Summarize, Event::Restart) => {
            let credential = ctx.credential.take();
            *ctx = WorkflowContext {
                credential,
                ..WorkflowContext::new(ctx.locale)
            };
            None
        }
        (stage, Event::Retry) if stage.is_network() && ctx.error.is_some() && !ctx.loading => {
            ctx.enter(stage);
            ctx.stage_effect()
        }
        (stage, Event::Back) if !ctx.loading => {
            if let Some(previous) = stage.previous() {
                ctx.error = None;
                ctx.stage = previous;
            }
            None
        }
        (stage, _) => {
            log::debug!("{} ignored in {}", name, stage);
            None
        }
    };

    if ctx.stage != from {
        log::info!("workflow {} -> {} on {}", from, ctx.stage, name);
    }
    effect
}

/// Drives a [`WorkflowContext`], running effects synchronously.
pub struct Workflow<'a> {
    ctx: WorkflowContext,
    assistant: &'a dyn Assistant,
    settings: Settings,
}

impl<'a> Workflow<'a> {
    pub fn new(assistant: &'a dyn Assistant, settings: Settings, locale: Locale) -> Self {
        Self {
            ctx: WorkflowContext::new(locale),
            assistant,
            settings,
        }
    }

    /// Apply an event, then run effects until the machine is idle.
    pub fn send(&mut self, event: Event) {
        let mut pending = transition(&mut self.ctx, event);
        while let Some(effect) = pending {
            let done = self.dispatch(effect);
            pending = transition(&mut self.ctx, done);
        }
    }

    /// Run one effect and report its completion event.
    pub fn dispatch(&self, effect: Effect) -> Event {
        let ai = AiAccess::new(self.assistant, self.ctx.credential.as_ref());
        let locale = self.ctx.locale;
        match effect {
            Effect::ParseFiles { standard, check } => {
                Event::ParseDone(parse_files(&standard, &check, &self.settings, &ai))
            }
            Effect::Classify => Event::ClassifyDone(match &self.ctx.parsed {
                Some(parsed) => remote::classify(&ai, &parsed.standard.entries, &parsed.check.entries, locale),
                None => Err(ReconError::InputMissing("parsed entries".to_string())),
            }),
            Effect::Calculate => Event::CalculateDone(calculate(&self.ctx.categories)),
            Effect::Summarize => Event::SummaryDone(remote::summarize(&ai, &self.ctx.categories, locale)),
        }
    }

    pub fn set_file(&mut self, source: Source, path: impl Into<PathBuf>) {
        self.send(Event::SetFile(source, path.into()));
    }

    pub fn set_credential(&mut self, key: impl Into<String>) {
        self.send(Event::SetCredential(key.into()));
    }

    pub fn next(&mut self) {
        self.send(Event::Next);
    }

    pub fn back(&mut self) {
        self.send(Event::Back);
    }

    pub fn skip(&mut self) {
        self.send(Event::Skip);
    }

    pub fn move_entry(&mut self, entry_id: &str, from: &str, to: &str) {
        self.send(Event::MoveEntry {
            entry_id: entry_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    pub fn retry(&mut self) {
        self.send(Event::Retry);
    }

    pub fn restart(&mut self) {
        self.send(Event::Restart);
    }

    pub fn context(&self) -> &WorkflowContext {
        &self.ctx
    }

    pub fn stage(&self) -> Stage {
        self.ctx.stage
    }

    pub fn is_loading(&self) -> bool {
        self.ctx.loading
    }

    pub fn error(&self) -> Option<&ReconError> {
        self.ctx.error.as_ref()
    }

    pub fn error_message(&self) -> Option<String> {
        self.ctx.error_message()
    }

    pub fn parsed(&self) -> Option<&ParsedData> {
        self.ctx.parsed.as_ref()
    }

    pub fn categories(&self) -> &CategoryMap {
        &self.ctx.categories
    }

    pub fn summary(&self) -> &str {
        &self.ctx.summary
    }
}
