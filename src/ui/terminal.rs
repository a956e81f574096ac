// Terminal drawer - interactive shell on the connected device

use crate::connection::link::{DeviceLink, LinkError, ShellProcess};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Bridges a line-based local input and a byte output to a device shell
///
/// Returns when the remote shell exits, or once the local input is closed
/// and the shell has flushed its remaining output.
pub async fn run_terminal<L, R, W>(link: &L, input: R, mut output: W) -> Result<(), LinkError>
where
    L: DeviceLink,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let ShellProcess {
        input: shell_input,
        output: mut shell_output,
    } = link.spawn_shell(None).await?;
    tracing::info!(serial = link.serial(), "Terminal opened");

    let mut lines = input.lines();
    let mut input_closed = false;

    loop {
        tokio::select! {
            chunk = shell_output.next_chunk() => match chunk {
                Some(text) => {
                    output.write_all(text.as_bytes()).await?;
                    output.flush().await?;
                }
                None => break,
            },
            line = lines.next_line() => match line? {
                Some(mut line) => {
                    line.push('\n');
                    shell_input.write(line.as_bytes()).await?;
                }
                None => {
                    input_closed = true;
                    break;
                }
            },
        }
    }

    if input_closed {
        // EOF on the shell's stdin, then collect what it still prints
        drop(shell_input);
        while let Some(text) = shell_output.next_chunk().await {
            output.write_all(text.as_bytes()).await?;
        }
        output.flush().await?;
    }

    tracing::info!("Terminal closed");
    Ok(())
}
