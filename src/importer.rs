//! Import orchestration.
//!
//! An import runs in one pass:
//! 1. Resolve the canonical repository and service account
//! 2. Build and show the preview
//! 3. Ask for confirmation unless forced or dry
//! 4. Apply stores, then stacks, then builders
//!
//! The first error ends the run. Objects written before it stay written.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::cluster::{get_optional, ClusterAccessor, ConfigResolver, ResourceClient};
use crate::descriptor::DependencyDescriptor;
use crate::error::{ClusterError, Result};
use crate::planner::{
    build_plan, expand_defaults, DiffEngine, DiffType, Preview, Resolutions, StackResolution,
};
use crate::prompt::Confirm;
use crate::registry::Registry;
use crate::resources::{
    prepare_update, ClusterBuilder, ClusterResource, ClusterStack, ClusterStore, ImportContext,
    ResolvedStack, ResourceKind,
};

/// Question asked before applying.
pub const CONFIRM_MESSAGE: &str = "Confirm with y:";

/// Answers accepted as yes.
pub const ACCEPTED_TOKENS: &[&str] = &["y", "Y", "yes", "Yes", "YES"];

/// Notice printed when the operator declines.
pub const SKIPPING_MESSAGE: &str = "Skipping import";

/// Source of the timestamp stamped on written objects.
pub trait Clock: Send + Sync {
    /// Returns the current time as RFC 3339.
    fn now(&self) -> String;
}

/// Wall clock in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Receives what an import has to say.
pub trait ImportReporter {
    /// Shows the preview before confirmation.
    ///
    /// # Errors
    ///
    /// Returns an error if the output cannot be written.
    fn preview(&mut self, preview: &Preview) -> Result<()>;

    /// Shows one progress line of the apply phase.
    ///
    /// # Errors
    ///
    /// Returns an error if the output cannot be written.
    fn progress(&mut self, line: &str) -> Result<()>;

    /// Shows a notice that must not be suppressed.
    ///
    /// # Errors
    ///
    /// Returns an error if the output cannot be written.
    fn notice(&mut self, line: &str) -> Result<()>;
}

/// How far an import is allowed to go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Upload images and write objects.
    #[default]
    Apply,
    /// Only compute what would be written.
    DryRun,
    /// Upload images but write no objects.
    DryRunWithImageUpload,
}

impl RunMode {
    /// Returns true if images are copied to the canonical repository.
    #[must_use]
    pub const fn uploads(self) -> bool {
        matches!(self, Self::Apply | Self::DryRunWithImageUpload)
    }

    /// Returns true if objects are written to the cluster.
    #[must_use]
    pub const fn writes(self) -> bool {
        matches!(self, Self::Apply)
    }

    /// Returns true for either dry run.
    #[must_use]
    pub const fn is_dry_run(self) -> bool {
        !self.writes()
    }
}

/// Options of one import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// Skip the confirmation prompt.
    pub force: bool,
    /// Run mode.
    pub mode: RunMode,
}

/// What happened to a written object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// The object did not exist.
    Created,
    /// The object existed with a different spec.
    Updated,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
        }
    }
}

/// One object written (or, in a dry run, that would be written).
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedObject {
    /// Kind of the object.
    pub kind: ResourceKind,
    /// Object name.
    pub name: String,
    /// Create or update.
    pub action: ActionType,
    /// The object as returned by the cluster.
    pub manifest: serde_json::Value,
}

/// Objects written by an import, in apply order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    /// Written objects.
    pub applied: Vec<AppliedObject>,
    /// Whether nothing was actually written.
    pub dry_run: bool,
}

impl ImportReport {
    /// Returns the number of objects with the given action.
    #[must_use]
    pub fn count(&self, action: ActionType) -> usize {
        self.applied.iter().filter(|o| o.action == action).count()
    }

    fn record<R: ClusterResource>(&mut self, action: ActionType, object: &R) -> Result<()> {
        let manifest = object.to_manifest().map_err(|e| ClusterError::Conversion {
            kind: R::KIND,
            name: object.name().to_string(),
            message: e.to_string(),
        })?;

        self.applied.push(AppliedObject {
            kind: R::KIND,
            name: object.name().to_string(),
            action,
            manifest,
        });
        Ok(())
    }
}

/// Result of an import run.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    /// The operator declined; nothing was written.
    Skipped,
    /// The import ran to completion.
    Imported(ImportReport),
}

/// Reconciles a dependency descriptor against the cluster.
pub struct Importer<'a> {
    cluster: &'a dyn ClusterAccessor,
    registry: &'a dyn Registry,
    config: &'a dyn ConfigResolver,
    confirm: &'a dyn Confirm,
    clock: &'a dyn Clock,
    options: ImportOptions,
}

impl std::fmt::Debug for Importer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Importer")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<'a> Importer<'a> {
    /// Creates an importer over the given collaborators.
    #[must_use]
    pub fn new(
        cluster: &'a dyn ClusterAccessor,
        registry: &'a dyn Registry,
        config: &'a dyn ConfigResolver,
        confirm: &'a dyn Confirm,
    ) -> Self {
        Self {
            cluster,
            registry,
            config,
            confirm,
            clock: &SystemClock,
            options: ImportOptions::default(),
        }
    }

    /// Sets the run options.
    #[must_use]
    pub const fn with_options(mut self, options: ImportOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the clock.
    #[must_use]
    pub const fn with_clock(mut self, clock: &'a dyn Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Runs the import.
    ///
    /// # Errors
    ///
    /// Returns the first configuration, lookup, registry or write error.
    /// Objects written before the error are not rolled back.
    pub async fn run(
        &self,
        descriptor: &DependencyDescriptor,
        reporter: &mut dyn ImportReporter,
    ) -> Result<ImportOutcome> {
        let ctx = self.context().await?;
        let plan = build_plan(self.cluster, self.registry, &ctx, descriptor).await?;
        reporter.preview(&plan.preview)?;

        let mode = self.options.mode;
        if !mode.is_dry_run()
            && !self.options.force
            && !self.confirm.confirm(CONFIRM_MESSAGE, ACCEPTED_TOKENS)?
        {
            reporter.notice(SKIPPING_MESSAGE)?;
            return Ok(ImportOutcome::Skipped);
        }

        let mut report = ImportReport {
            applied: Vec::new(),
            dry_run: mode.is_dry_run(),
        };

        info!("Applying cluster stores");
        self.apply_stores(descriptor, &ctx, &plan.resolutions, reporter, &mut report)
            .await?;
        info!("Applying cluster stacks");
        self.apply_stacks(descriptor, &ctx, &plan.resolutions, reporter, &mut report)
            .await?;
        info!("Applying cluster builders");
        self.apply_builders(descriptor, &ctx, reporter, &mut report)
            .await?;

        info!(
            "Import finished: {} created, {} updated",
            report.count(ActionType::Created),
            report.count(ActionType::Updated)
        );
        Ok(ImportOutcome::Imported(report))
    }

    async fn context(&self) -> Result<ImportContext> {
        Ok(ImportContext {
            repository: self.config.canonical_repository().await?,
            service_account: self.config.canonical_service_account().await?,
            timestamp: self.clock.now(),
        })
    }

    async fn apply_stores(
        &self,
        descriptor: &DependencyDescriptor,
        ctx: &ImportContext,
        resolutions: &Resolutions,
        reporter: &mut dyn ImportReporter,
        report: &mut ImportReport,
    ) -> Result<()> {
        for (entry, sources) in descriptor.cluster_stores.iter().zip(&resolutions.stores) {
            reporter.progress(&format!("Importing Cluster Store '{}'...", entry.name))?;
            let current = get_optional::<ClusterStore, _>(self.cluster, &entry.name).await?;

            reporter.progress(&format!("Uploading to '{}'...", ctx.repository))?;
            let mut targets = Vec::with_capacity(sources.len());
            for source in sources {
                if current.as_ref().is_some_and(|store| store.contains(&source.target)) {
                    reporter.progress(&format!(
                        "Buildpackage '{}' already exists in the store",
                        source.target
                    ))?;
                    targets.push(source.target.clone());
                    continue;
                }

                let target = if self.options.mode.uploads() {
                    let destination = ctx.store_source_destination(&source.image)?;
                    self.registry.relocate(&source.image, &destination).await?
                } else {
                    source.target.clone()
                };

                if current.is_some() {
                    reporter.progress(&format!("Added Buildpackage '{target}'"))?;
                }
                targets.push(target);
            }

            let desired = ctx.desired_store(&entry.name, current.as_ref(), &targets);
            write(self.cluster, self.options.mode, current.as_ref(), &desired, report).await?;
        }
        Ok(())
    }

    async fn apply_stacks(
        &self,
        descriptor: &DependencyDescriptor,
        ctx: &ImportContext,
        resolutions: &Resolutions,
        reporter: &mut dyn ImportReporter,
        report: &mut ImportReport,
    ) -> Result<()> {
        let mut relocated: Vec<Option<ResolvedStack>> = vec![None; resolutions.stacks.len()];

        for target in expand_defaults(&descriptor.cluster_stacks) {
            reporter.progress(&format!("Importing Cluster Stack '{}'...", target.name))?;

            let resolved = match &relocated[target.index] {
                Some(resolved) => resolved.clone(),
                None => {
                    let resolved = self
                        .relocate_stack(ctx, &resolutions.stacks[target.index])
                        .await?;
                    relocated[target.index] = Some(resolved.clone());
                    resolved
                }
            };

            let current = get_optional::<ClusterStack, _>(self.cluster, target.name).await?;
            let desired = ctx.desired_stack(target.name, &resolved);
            write(self.cluster, self.options.mode, current.as_ref(), &desired, report).await?;
        }
        Ok(())
    }

    async fn relocate_stack(
        &self,
        ctx: &ImportContext,
        resolution: &StackResolution,
    ) -> Result<ResolvedStack> {
        if !self.options.mode.uploads() {
            return Ok(resolution.resolved.clone());
        }

        let build_image = self
            .registry
            .relocate(&resolution.build_source, &ctx.stack_image_destination("build"))
            .await?;
        let run_image = self
            .registry
            .relocate(&resolution.run_source, &ctx.stack_image_destination("run"))
            .await?;

        Ok(ResolvedStack {
            id: resolution.resolved.id.clone(),
            build_image,
            run_image,
        })
    }

    async fn apply_builders(
        &self,
        descriptor: &DependencyDescriptor,
        ctx: &ImportContext,
        reporter: &mut dyn ImportReporter,
        report: &mut ImportReport,
    ) -> Result<()> {
        for target in expand_defaults(&descriptor.cluster_builders) {
            reporter.progress(&format!("Importing Custom Cluster Builder '{}'...", target.name))?;

            let current = get_optional::<ClusterBuilder, _>(self.cluster, target.name).await?;
            let desired = ctx.desired_builder(target.name, target.entry);
            write(self.cluster, self.options.mode, current.as_ref(), &desired, report).await?;
        }
        Ok(())
    }
}

/// Creates or updates one object unless its spec is unchanged.
async fn write<R, C>(
    client: &C,
    mode: RunMode,
    current: Option<&R>,
    desired: &R,
    report: &mut ImportReport,
) -> Result<()>
where
    R: ClusterResource,
    C: ResourceClient<R> + ?Sized,
{
    let diff = DiffEngine::new().diff(current, desired)?;
    if diff.diff_type == DiffType::NoChange {
        debug!("{} '{}' unchanged", R::KIND, desired.name());
        return Ok(());
    }

    match current {
        None => {
            let stored = if mode.writes() {
                client.create(desired).await?
            } else {
                desired.clone()
            };
            debug!("Created {} '{}'", R::KIND, desired.name());
            report.record(ActionType::Created, &stored)
        }
        Some(current) => {
            let update = prepare_update(current, desired);
            let stored = if mode.writes() {
                client.update(&update).await?
            } else {
                update
            };
            debug!("Updated {} '{}'", R::KIND, desired.name());
            report.record(ActionType::Updated, &stored)
        }
    }
}
