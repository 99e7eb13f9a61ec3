//! Project commands: listing, cache clearing and environment variables.

use crate::error::CliError;
use crate::output::print_payload;

use super::CommandContext;

/// List followed projects.
pub async fn list(ctx: &CommandContext) -> Result<(), CliError> {
    let payload = ctx
        .client()?
        .projects(ctx.request.verbose, &ctx.request.filters)
        .await
        .map_err(|e| ctx.api_error(e))?;

    print_payload(&payload);
    Ok(())
}

/// Clear a project's build cache.
pub async fn clear_cache(ctx: &CommandContext) -> Result<(), CliError> {
    let project = ctx.require_project()?;

    let payload = ctx
        .client()?
        .clear_cache(&project, ctx.request.verbose)
        .await
        .map_err(|e| ctx.api_error(e))?;

    print_payload(&payload);
    Ok(())
}

/// List environment variable names, or apply `--set` assignments.
pub async fn envvars(ctx: &CommandContext) -> Result<(), CliError> {
    let project = ctx.require_project()?;

    if !ctx.request.assignments.is_empty() {
        tracing::debug!(
            count = ctx.request.assignments.len(),
            "Setting environment variables"
        );
    }

    let payload = ctx
        .client()?
        .envvar(&project, ctx.request.verbose, &ctx.request.assignments)
        .await
        .map_err(|e| ctx.api_error(e))?;

    print_payload(&payload);
    Ok(())
}
