//! Outbound quest notifications.
//!
//! Messages are encoded as MessagePack envelopes `[13, "msgType", {data}]`,
//! the same framing the game client already understands.

use rmpv::Value;
use serde::Serialize;

/// Envelope code for room data frames
pub const ROOM_DATA: u8 = 13;

/// Label shown next to destroy_multi counters
pub const DESTROY_COUNTER_LABEL: &str = "@quest/groundquests:destroy_counter";

/// Message box geometry (width, height) and screen location (x, y)
pub const MESSAGE_BOX_SIZE: (u32, u32) = (384, 256);
pub const MESSAGE_BOX_LOCATION: (u32, u32) = (320, 256);

pub const QUEST_SYSTEM_TABLE: &str = "quest/ground/system_message";
pub const GROUND_QUESTS_TABLE: &str = "quest/groundquests";

/// Chat channel a system message is delivered on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatChannel {
    Personal,
    Quest,
}

/// Single prose parameter substituted into a string table entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProseArg {
    /// Text target (`%TO`)
    To(String),
    /// Integer (`%DI`)
    Di(i32),
}

/// Buttons shown on a message box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageBoxButtons {
    Ok,
}

/// Notifications produced by the quest engine for a single player
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QuestMessage {
    /// Personal system message built from a string table entry
    SystemMessage {
        channel: ChatChannel,
        table: String,
        key: String,
        prose: Option<ProseArg>,
    },
    QuestCompleted {
        quest_name: String,
        quest_crc: u32,
    },
    /// Counter display for a task (destroy_multi kills)
    TaskCounter {
        quest_name: String,
        task: usize,
        label: String,
        counter: i32,
        max: i32,
    },
    /// Communication popup with an NPC portrait
    CommPlayer {
        text: String,
        appearance_crc: u32,
        duration_secs: f32,
    },
    MessageBox {
        title: String,
        text: String,
        buttons: MessageBoxButtons,
        width: u32,
        height: u32,
        x: u32,
        y: u32,
    },
    PlayMusic {
        sound: String,
    },
}

impl QuestMessage {
    pub fn system(channel: ChatChannel, table: &str, key: &str, prose: Option<ProseArg>) -> Self {
        QuestMessage::SystemMessage {
            channel,
            table: table.to_string(),
            key: key.to_string(),
            prose,
        }
    }

    pub fn task_counter(quest_name: &str, task: usize, counter: i32, max: i32) -> Self {
        QuestMessage::TaskCounter {
            quest_name: quest_name.to_string(),
            task,
            label: DESTROY_COUNTER_LABEL.to_string(),
            counter,
            max,
        }
    }

    pub fn message_box(title: &str, text: &str) -> Self {
        QuestMessage::MessageBox {
            title: title.to_string(),
            text: text.to_string(),
            buttons: MessageBoxButtons::Ok,
            width: MESSAGE_BOX_SIZE.0,
            height: MESSAGE_BOX_SIZE.1,
            x: MESSAGE_BOX_LOCATION.0,
            y: MESSAGE_BOX_LOCATION.1,
        }
    }

    pub fn msg_type(&self) -> &'static str {
        match self {
            QuestMessage::SystemMessage { .. } => "systemMessage",
            QuestMessage::QuestCompleted { .. } => "questCompleted",
            QuestMessage::TaskCounter { .. } => "questTaskCounter",
            QuestMessage::CommPlayer { .. } => "commPlayer",
            QuestMessage::MessageBox { .. } => "messageBox",
            QuestMessage::PlayMusic { .. } => "playMusic",
        }
    }
}

/// Encode a notification into its MessagePack envelope
pub fn encode_quest_message(msg: &QuestMessage) -> Result<Vec<u8>, String> {
    let data = rmpv::ext::to_value(msg)
        .map_err(|e| format!("Failed to convert {}: {}", msg.msg_type(), e))?;

    let array = Value::Array(vec![
        Value::Integer(ROOM_DATA.into()),
        Value::String(msg.msg_type().into()),
        data,
    ]);

    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &array)
        .map_err(|e| format!("Failed to encode message: {}", e))?;

    Ok(buf)
}

/// 32-bit string hash used by the client for template and quest lookups
/// (CRC-32, polynomial 0x04C11DB7, MSB first, inverted in and out).
pub fn string_crc(s: &str) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in s.as_bytes() {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04C1_1DB7
            } else {
                crc << 1
            };
        }
    }
    !crc
}

/// Client-side form of a server template:
/// `object/mobile/foo.iff` -> `object/mobile/shared_foo.iff`
pub fn shared_template(server_template: &str) -> String {
    let (dir, file) = match server_template.rfind('/') {
        Some(pos) => server_template.split_at(pos + 1),
        None => ("", server_template),
    };
    if file.starts_with("shared_") {
        server_template.to_string()
    } else {
        format!("{}shared_{}", dir, file)
    }
}
