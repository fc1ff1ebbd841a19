//! # 進捗イベントバス
//!
//! コンバージョンごとの broadcast チャネル。
//! チャネルは実行中のあいだだけ存在する。[`EventBus::open`] が返す
//! [`EventChannel`] の drop か終端イベントの発行でチャネルを閉じ、購読者は `Closed` を受け取る。

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use leadconv_domain::conversion::{ConversionEvent, ConversionId};
use tokio::sync::broadcast;

/// 1 チャネルあたりのバッファ数
const CHANNEL_CAPACITY: usize = 64;

struct Channel {
    generation: u64,
    sender:     broadcast::Sender<ConversionEvent>,
}

#[derive(Default)]
struct Channels {
    next_generation: u64,
    open:            HashMap<ConversionId, Channel>,
}

type SharedChannels = Arc<Mutex<Channels>>;

#[derive(Default, Clone)]
pub struct EventBus {
    channels: SharedChannels,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 実行の開始時にチャネルを開く
    ///
    /// 同じ ID のチャネルが残っていれば置き換える。
    pub fn open(&self, id: &ConversionId) -> EventChannel {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.next_generation += 1;
        let generation = channels.next_generation;
        channels.open.insert(id.clone(), Channel {
            generation,
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
        });

        EventChannel {
            channels: self.channels.clone(),
            id: id.clone(),
            generation,
        }
    }

    /// 実行中のコンバージョンの進捗を購読する
    ///
    /// 実行中でなければ `None` を返す。
    pub fn subscribe(&self, id: &ConversionId) -> Option<broadcast::Receiver<ConversionEvent>> {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.open.get(id).map(|c| c.sender.subscribe())
    }

    pub fn publish(&self, event: ConversionEvent) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let id = event.conversion_id.clone();
        let terminal = event.is_terminal();

        if terminal {
            if let Some(channel) = channels.open.remove(&id) {
                // 受信者がいない場合のエラーは無視する
                let _ = channel.sender.send(event);
            }
        } else if let Some(channel) = channels.open.get(&id) {
            let _ = channel.sender.send(event);
        }
    }
}

/// 開いたチャネル
///
/// drop でチャネルを閉じる。後から同じ ID で開き直されたチャネルには触れない。
pub struct EventChannel {
    channels:   SharedChannels,
    id:         ConversionId,
    generation: u64,
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        if channels
            .open
            .get(&self.id)
            .is_some_and(|c| c.generation == self.generation)
        {
            channels.open.remove(&self.id);
        }
    }
}
