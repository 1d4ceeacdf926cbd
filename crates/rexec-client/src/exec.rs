//! One-shot remote command execution.

use rexec_core::RexecResult;
use tracing::debug;

use crate::session::SessionHandle;
use crate::transport::{CommandOutput, RpcChannel};

/// Run `command` through the remote shell and wait for it to finish.
///
/// A non-zero exit code is a normal result, not an error.
pub async fn exec<C: RpcChannel>(
    session: &mut SessionHandle<C>,
    command: &str,
) -> RexecResult<CommandOutput> {
    debug!(command, "executing");
    let output = session.channel_mut().exec_command(command).await?;
    debug!(
        exit_code = output.exit_code,
        stdout_len = output.stdout.len(),
        stderr_len = output.stderr.len(),
        "command finished"
    );
    Ok(output)
}
