//! Build commands: list/show, artifacts, retry and cancel.

use crate::error::CliError;
use crate::output::print_payload;

use super::CommandContext;

/// List a project's builds, or show one build when `--build-num` is given.
pub async fn list_or_show(ctx: &CommandContext) -> Result<(), CliError> {
    let project = ctx.require_project()?;
    let request = &ctx.request;

    let payload = ctx
        .client()?
        .builds(
            &project,
            request.build_num,
            request.verbose,
            &request.filters,
        )
        .await
        .map_err(|e| ctx.api_error(e))?;

    print_payload(&payload);
    Ok(())
}

/// List the artifacts of a build.
pub async fn artifacts(ctx: &CommandContext) -> Result<(), CliError> {
    let project = ctx.require_project()?;
    let build_num = ctx.require_build_num()?;

    let payload = ctx
        .client()?
        .artifacts(&project, build_num, ctx.request.verbose, &ctx.request.filters)
        .await
        .map_err(|e| ctx.api_error(e))?;

    print_payload(&payload);
    Ok(())
}

/// Retry a build.
pub async fn retry(ctx: &CommandContext) -> Result<(), CliError> {
    let project = ctx.require_project()?;
    let build_num = ctx.require_build_num()?;

    let payload = ctx
        .client()?
        .retry_build(&project, build_num, ctx.request.verbose)
        .await
        .map_err(|e| ctx.api_error(e))?;

    print_payload(&payload);
    Ok(())
}

/// Cancel a build.
pub async fn cancel(ctx: &CommandContext) -> Result<(), CliError> {
    let project = ctx.require_project()?;
    let build_num = ctx.require_build_num()?;

    let payload = ctx
        .client()?
        .cancel_build(&project, build_num, ctx.request.verbose)
        .await
        .map_err(|e| ctx.api_error(e))?;

    print_payload(&payload);
    Ok(())
}
