//! コマンド履歴の管理。
//!
//! 固定容量のリングバッファ。容量に達したら最も古いエントリを捨てる。
//! [`Shell`](crate::shell::Shell) が所有し、実行前の各行を [`History::record`] で記録する。
//! 永続化はしない（プロセス終了で破棄）。

use std::collections::VecDeque;

/// 既定の最大エントリ数。
pub const DEFAULT_CAPACITY: usize = 50;

/// コマンド履歴。古い順に保持する。
#[derive(Debug)]
pub struct History {
    entries: VecDeque<String>,
    capacity: usize,
}

impl History {
    /// 容量 `capacity` の空の履歴を作る。`0` なら何も記録しない。
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// 1 行を記録する。空白のみの行は記録しない。
    pub fn record(&mut self, line: &str) {
        if line.trim().is_empty() || self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(line.to_string());
    }

    /// 古い順のイテレータ。
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for History {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}
