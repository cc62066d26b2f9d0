//! # Bot Module
//!
//! Serenity event handler that turns chat commands into soundboard triggers.
//!
//! A message like `!airhorn` or `!airhorn reverb` is matched against the
//! catalog's command aliases. The requester's current voice channel is read
//! from the guild cache and the trigger is handed to the [`Soundboard`]. The
//! command message is deleted afterwards to keep the channel clean.
//!
//! Nothing is reported back to the user: a full queue, an unknown clip name
//! or a failed voice connection all end silently.

use anyhow::Result;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Message, Ready, UserId},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::audio::{catalog::Trigger, player::Soundboard};

/// Comando que lista todos los alias disponibles
const LIST_COMMANDS: &str = "!listcommands";

/// Main Discord event handler.
pub struct HornBot {
    board: Arc<Soundboard>,
}

impl HornBot {
    pub fn new(board: Arc<Soundboard>) -> Self {
        Self { board }
    }

    async fn handle_message(&self, ctx: &Context, msg: &Message) -> Result<()> {
        let Some(guild_id) = msg.guild_id else {
            return Ok(());
        };
        let Some((command, clip_name)) = parse_command(&msg.content) else {
            return Ok(());
        };

        if command == LIST_COMMANDS {
            let list = format!("Command List: {}", self.board.catalog().commands().join(" "));
            msg.channel_id.say(&ctx.http, list).await?;
            return Ok(());
        }

        let Some(group) = self.board.catalog().find_by_command(&command) else {
            return Ok(());
        };

        let Some(channel_id) = user_voice_channel(ctx, guild_id, msg.author.id) else {
            warn!(
                "⚠️ {} usó {} en guild {} fuera de un canal de voz",
                msg.author.name, command, guild_id
            );
            return Ok(());
        };

        let outcome = self.board.on_trigger(Trigger {
            user_id: msg.author.id,
            guild_id,
            channel_id,
            group,
            clip_name,
        });
        debug!("📝 {} en guild {}: {:?}", command, guild_id, outcome);

        if let Err(e) = msg.delete(&ctx.http).await {
            debug!("No se pudo borrar el mensaje del comando: {:?}", e);
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for HornBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        if let Err(e) = self.handle_message(&ctx, &msg).await {
            error!("Error manejando mensaje: {:?}", e);
        }
    }
}

/// Splits `!command [clip]` into its lowercase command and optional clip name.
fn parse_command(content: &str) -> Option<(String, Option<String>)> {
    let content = content.trim();
    if !content.starts_with('!') {
        return None;
    }

    let lowered = content.to_lowercase();
    let mut parts = lowered.split_whitespace();
    let command = parts.next()?.to_string();
    let clip_name = parts.next().map(str::to_string);
    Some((command, clip_name))
}

// Funciones auxiliares

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild.voice_states.get(&user_id).and_then(|voice_state| voice_state.channel_id)
}
