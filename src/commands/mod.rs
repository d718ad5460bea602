//! Command surface
//!
//! Turns an [`Invocation`] into gate and playback calls and renders the
//! user-facing [`Reply`]. Every failure ends up as an ephemeral reply.

use serde::{Deserialize, Serialize};

use crate::access::Membership;
use crate::constants::MAX_QUEUE_DISPLAY;
use crate::error::{Error, PermissionError, Result};
use crate::playback::{Enqueued, PlaybackHandle};
use crate::protocol::{ChannelId, GuildId, UserId};
use crate::tts::find_voice;

pub const HELP_TEXT: &str = "\
**🤖 VoiceBot Help**
I can speak text and play music!

**🗣️ Speech**
`/say <text>` - Speak text in your voice channel
`/setvoice <voice>` - Choose the voice (20+ options)

**🎵 Music**
`/play <url>` - Play (or add to the queue)
`/skip` - Skip the current track
`/queue` - Show the queue
`/stop` - Stop and clear the queue

**⚙️ Management**
`/leave` - Kick the bot from the channel
`/admin add|remove|list` - Manage access (admin only)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Command {
    Say { text: String },
    SetVoice { voice: String },
    Play { url: String },
    Skip,
    Queue,
    Stop,
    Leave,
    Help,
    AdminAdd { user: UserId },
    AdminRemove { user: UserId },
    AdminList,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Say { .. } => "say",
            Command::SetVoice { .. } => "setvoice",
            Command::Play { .. } => "play",
            Command::Skip => "skip",
            Command::Queue => "queue",
            Command::Stop => "stop",
            Command::Leave => "leave",
            Command::Help => "help",
            Command::AdminAdd { .. } => "admin add",
            Command::AdminRemove { .. } => "admin remove",
            Command::AdminList => "admin list",
        }
    }

    /// Admin commands check the admin identity instead of the allow-list
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Command::AdminAdd { .. } | Command::AdminRemove { .. } | Command::AdminList
        )
    }
}

/// A command as invoked by a user in a guild
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub guild_id: GuildId,
    pub user_id: UserId,
    /// The voice channel the invoker is currently in
    #[serde(default)]
    pub voice_channel: Option<ChannelId>,
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub content: String,
    /// Only visible to the invoker
    pub ephemeral: bool,
}

impl Reply {
    pub fn private(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: true,
        }
    }

    pub fn public(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: false,
        }
    }
}

/// Acknowledges deferred commands before their follow-up reply is ready
pub trait Responder: Send + Sync {
    fn defer(&self, invocation: &Invocation);
}

/// Acknowledges with a log line; used by the HTTP surface
pub struct LogResponder;

impl Responder for LogResponder {
    fn defer(&self, invocation: &Invocation) {
        tracing::info!(
            guild = %invocation.guild_id,
            user = %invocation.user_id,
            command = invocation.command.name(),
            "Command deferred"
        );
    }
}

/// Render the queue listing: the first few titles plus a remainder line
pub fn format_queue(titles: &[String]) -> String {
    if titles.is_empty() {
        return "📂 The queue is empty.".to_string();
    }
    let mut out = String::from("**📂 Music queue**\n");
    for (i, title) in titles.iter().take(MAX_QUEUE_DISPLAY).enumerate() {
        out.push_str(&format!("**{}.** {}\n", i + 1, title));
    }
    if titles.len() > MAX_QUEUE_DISPLAY {
        out.push_str(&format!(
            "\n*... and {} more tracks*",
            titles.len() - MAX_QUEUE_DISPLAY
        ));
    }
    out
}

fn format_allow_list(users: &[UserId]) -> String {
    if users.is_empty() {
        return "The list is empty (only the admin has access).".to_string();
    }
    let mut out = String::from("**Allow-list:**\n");
    for user in users {
        out.push_str(&user.mention());
        out.push('\n');
    }
    out
}

/// Convert a failed command into what the invoker sees
pub fn error_reply(error: &Error) -> Reply {
    let content = match error {
        Error::Permission(PermissionError::NotAllowed) => {
            "⛔ **Access denied!** Only the admin can allow you to use the bot.".to_string()
        }
        Error::Permission(PermissionError::AdminOnly) => "⛔ You are not the admin!".to_string(),
        Error::Resolution(e) => format!("Failed to process the link: {}", e),
        Error::Synthesis(e) => format!("Speech generation failed: {}", e),
        Error::Transport(e) => format!("Voice connection error: {}", e),
        Error::Io(e) => format!("Failed to save the allow-list: {}", e),
        other => format!("Error: {}", other),
    };
    Reply::private(content)
}

#[derive(Clone)]
pub struct CommandSurface {
    playback: PlaybackHandle,
}

impl CommandSurface {
    pub fn new(playback: PlaybackHandle) -> Self {
        Self { playback }
    }

    pub fn playback(&self) -> &PlaybackHandle {
        &self.playback
    }

    /// Run one invocation to completion. Never fails; errors become replies.
    pub async fn dispatch(&self, invocation: Invocation, responder: &dyn Responder) -> Reply {
        let guild = invocation.guild_id;
        let name = invocation.command.name();
        match self.execute(invocation, responder).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::debug!(guild = %guild, command = name, error = %e, "Command failed");
                error_reply(&e)
            }
        }
    }

    async fn execute(&self, invocation: Invocation, responder: &dyn Responder) -> Result<Reply> {
        let actor = invocation.user_id;
        let guild = invocation.guild_id;
        if !invocation.command.is_admin() && !self.playback.is_allowed(actor).await? {
            tracing::info!(user = %actor, command = invocation.command.name(), "Command denied");
            return Err(PermissionError::NotAllowed.into());
        }

        match &invocation.command {
            Command::Say { text } => {
                let Some(channel) = join_target(&invocation, responder) else {
                    return Ok(not_in_voice());
                };
                self.playback.say(guild, channel, text.clone()).await?;
                Ok(Reply::private("✅ Spoken"))
            }
            Command::Play { url } => {
                let Some(channel) = join_target(&invocation, responder) else {
                    return Ok(not_in_voice());
                };
                let reply = match self.playback.play(guild, channel, url.clone()).await? {
                    Enqueued::Playlist { count } => {
                        format!("📚 **Playlist added!** ({} tracks)", count)
                    }
                    Enqueued::Track { title } => format!("🎵 **Added to queue:** {}", title),
                };
                Ok(Reply::private(reply))
            }
            Command::SetVoice { voice } => match find_voice(voice) {
                Some(found) => {
                    self.playback.set_voice(guild, found.id.to_string()).await?;
                    Ok(Reply::private(format!("✅ Voice changed to: **{}**", found.name)))
                }
                None => Ok(Reply::private(format!("Unknown voice: {}", voice))),
            },
            Command::Skip => {
                let reply = if self.playback.skip(guild).await? {
                    "⏭️ Track skipped."
                } else {
                    "Nothing is playing."
                };
                Ok(Reply::private(reply))
            }
            Command::Queue => {
                let titles = self.playback.queue(guild).await?;
                Ok(Reply::private(format_queue(&titles)))
            }
            Command::Stop => {
                let reply = if self.playback.stop(guild).await? {
                    "⏹️ Stopped and cleared the queue."
                } else {
                    "Nothing is playing."
                };
                Ok(Reply::private(reply))
            }
            Command::Leave => {
                if self.playback.leave(guild).await? {
                    Ok(Reply::public("Disconnected. 👋"))
                } else {
                    Ok(Reply::private("I'm not in a channel."))
                }
            }
            Command::Help => Ok(Reply::private(HELP_TEXT)),
            Command::AdminAdd { user } => {
                let user = *user;
                let reply = match self.playback.admin_add(actor, user).await? {
                    Membership::Added => format!("✅ User {} added to the allow-list.", user.mention()),
                    _ => format!("ℹ️ User {} is already on the list.", user.mention()),
                };
                Ok(Reply::private(reply))
            }
            Command::AdminRemove { user } => {
                let user = *user;
                let reply = match self.playback.admin_remove(actor, user).await? {
                    Membership::Removed => {
                        format!("✅ User {} removed from the allow-list.", user.mention())
                    }
                    _ => format!("ℹ️ User {} is not on the list.", user.mention()),
                };
                Ok(Reply::private(reply))
            }
            Command::AdminList => {
                let users = self.playback.admin_list(actor).await?;
                Ok(Reply::private(format_allow_list(&users)))
            }
        }
    }
}

fn not_in_voice() -> Reply {
    Reply::private("You are not in a voice channel! ❌")
}

/// The invoker's voice channel; acknowledges the deferred command when present
fn join_target(invocation: &Invocation, responder: &dyn Responder) -> Option<ChannelId> {
    let channel = invocation.voice_channel?;
    responder.defer(invocation);
    Some(channel)
}
