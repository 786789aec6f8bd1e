//! Minimal command interpreter: `HELP`, and membership gating.

use async_trait::async_trait;
use relay_ports::{CommandExecutor, CommandResult, CommandStatus, Dispatchable, PortResult, Role};
use relay_protocol_types::Frame;

const HELP_COMMAND: &str = "HELP";

/// Answers `HELP`, refuses non-members and relays everything else.
#[derive(Debug, Default)]
pub struct RelayExecutor;

fn help_text(role: Role) -> String {
    match role {
        Role::Admin => "HELP: show this message\n\
             Any other message is broadcast to every member of the channel."
            .to_string(),
        _ => "HELP: show this message\n\
             Any other message is forwarded privately to the channel's admins."
            .to_string(),
    }
}

fn message_body(dispatchable: &Dispatchable) -> &str {
    match &dispatchable.frame {
        Frame::Message(message) => message.data.body().trim(),
        _ => "",
    }
}

#[async_trait]
impl CommandExecutor for RelayExecutor {
    async fn execute(&self, dispatchable: &Dispatchable) -> PortResult<CommandResult> {
        let role = dispatchable.sender.role;

        if message_body(dispatchable).eq_ignore_ascii_case(HELP_COMMAND) {
            return Ok(CommandResult {
                command: Some(HELP_COMMAND.to_string()),
                status: CommandStatus::Success,
                message: help_text(role),
            });
        }

        if role == Role::None {
            return Ok(CommandResult {
                command: None,
                status: CommandStatus::Error,
                message: format!(
                    "You are not a member of {}. Ask an admin to add you.",
                    dispatchable.channel.name
                ),
            });
        }

        Ok(CommandResult::noop())
    }
}
