//! # 実行中レジストリ
//!
//! 実行中のコンバージョンとキャンセルトークンの対応表。
//! 1 レコードにつき同時に 1 つの実行だけを許す。

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use leadconv_domain::conversion::ConversionId;
use tokio_util::sync::CancellationToken;

type ActiveRuns = Arc<Mutex<HashMap<ConversionId, CancellationToken>>>;

/// 実行中のコンバージョンの登録簿
#[derive(Default, Clone)]
pub struct RunRegistry {
    active: ActiveRuns,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 実行枠を確保する
    ///
    /// 既に実行中の場合は `None` を返す。
    pub fn try_acquire(&self, id: &ConversionId) -> Option<RunGuard> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if active.contains_key(id) {
            return None;
        }
        let token = CancellationToken::new();
        active.insert(id.clone(), token.clone());

        Some(RunGuard {
            active: self.active.clone(),
            id: id.clone(),
            token,
        })
    }

    /// 実行中のコンバージョンにキャンセルを要求する
    ///
    /// 実行中でなければ `false` を返す。
    pub fn cancel(&self, id: &ConversionId) -> bool {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        match active.get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, id: &ConversionId) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }
}

/// 確保した実行枠
///
/// drop で枠を解放する。
pub struct RunGuard {
    active: ActiveRuns,
    id:     ConversionId,
    token:  CancellationToken,
}

impl RunGuard {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_実行中のレコードは二重に確保できない() {
        let sut = RunRegistry::new();
        let id = ConversionId::new();

        let guard = sut.try_acquire(&id);

        assert!(guard.is_some());
        assert!(sut.try_acquire(&id).is_none());
        assert!(sut.try_acquire(&ConversionId::new()).is_some());
    }

    #[test]
    fn test_guardのdropで再確保できる() {
        let sut = RunRegistry::new();
        let id = ConversionId::new();

        drop(sut.try_acquire(&id));

        assert!(!sut.is_running(&id));
        assert!(sut.try_acquire(&id).is_some());
    }

    #[test]
    fn test_キャンセルはトークンに伝わる() {
        let sut = RunRegistry::new();
        let id = ConversionId::new();
        let guard = sut.try_acquire(&id).unwrap();

        assert!(sut.cancel(&id));
        assert!(guard.token().is_cancelled());
    }

    #[test]
    fn test_実行中でなければキャンセルできない() {
        let sut = RunRegistry::new();

        assert!(!sut.cancel(&ConversionId::new()));
    }
}
