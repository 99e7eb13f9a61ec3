//! Show who the token belongs to.

use crate::error::CliError;
use crate::output::print_payload;

use super::CommandContext;

pub async fn run(ctx: &CommandContext) -> Result<(), CliError> {
    let payload = ctx
        .client()?
        .me(ctx.request.verbose)
        .await
        .map_err(|e| ctx.api_error(e))?;

    print_payload(&payload);
    Ok(())
}
