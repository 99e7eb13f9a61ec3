//! Status command - show the CircleCI status page summary.
//!
//! Does not depend on the user's account, so no configuration is needed.

use crate::client::fetch_status;
use crate::error::CliError;
use crate::output::print_payload;

use super::Action;

pub async fn run(url: &str, verbose: bool) -> Result<(), CliError> {
    let payload = fetch_status(url, verbose)
        .await
        .map_err(|e| CliError::action(Action::Status, e))?;

    print_payload(&payload);
    Ok(())
}
