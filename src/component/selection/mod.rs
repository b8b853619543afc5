//! 場景選擇模型
//!
//! 純記憶體結構，持有操作員挑選的單一場景與群組；
//! 不碰磁碟也不碰編碼器。

use crate::error::SelectionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// 操作員定義的場景群組，成員順序即串接順序
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneGroup {
    pub id: usize,
    pub members: Vec<usize>,
}

/// 剪輯產生器的工作單位：單一場景或一個群組
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipUnit {
    Single(usize),
    Group { id: usize, members: Vec<usize> },
}

impl ClipUnit {
    /// 單元內最小的場景編號，用於單元排序
    fn first_scene(&self) -> usize {
        match self {
            Self::Single(index) => *index,
            Self::Group { members, .. } => members.iter().copied().min().unwrap_or(usize::MAX),
        }
    }
}

/// 場景選擇狀態
///
/// 不變量：任何場景編號不會同時出現在兩個群組，也不會同時
/// 存在於單選集合與群組中（加入群組時自動離開單選集合）。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    scene_count: usize,
    individual: BTreeSet<usize>,
    groups: Vec<SceneGroup>,
    next_group_id: usize,
}

impl Selection {
    #[must_use]
    pub fn new(scene_count: usize) -> Self {
        Self {
            scene_count,
            individual: BTreeSet::new(),
            groups: Vec::new(),
            next_group_id: 1,
        }
    }

    fn check_index(&self, index: usize) -> Result<(), SelectionError> {
        if index == 0 || index > self.scene_count {
            return Err(SelectionError::UnknownScene(index));
        }
        Ok(())
    }

    fn is_grouped(&self, index: usize) -> bool {
        self.groups.iter().any(|g| g.members.contains(&index))
    }

    /// 單選一個場景
    pub fn select(&mut self, index: usize) -> Result<(), SelectionError> {
        self.check_index(index)?;
        if self.is_grouped(index) {
            return Err(SelectionError::AlreadyGrouped(index));
        }
        self.individual.insert(index);
        Ok(())
    }

    pub fn deselect(&mut self, index: usize) -> Result<(), SelectionError> {
        self.check_index(index)?;
        self.individual.remove(&index);
        Ok(())
    }

    /// 建立群組，成員依傳入順序串接
    ///
    /// 已屬於其他群組的場景會被拒絕；已單選的場景會自動
    /// 移出單選集合。
    pub fn group(&mut self, indices: &[usize]) -> Result<usize, SelectionError> {
        if indices.is_empty() {
            return Err(SelectionError::EmptyGroup);
        }
        for &index in indices {
            self.check_index(index)?;
            if self.is_grouped(index) {
                return Err(SelectionError::AlreadyGrouped(index));
            }
        }
        // 同一次呼叫內的重複成員也違反群組不變量
        let unique: BTreeSet<usize> = indices.iter().copied().collect();
        if unique.len() != indices.len() {
            let duplicated = indices
                .iter()
                .copied()
                .find(|i| indices.iter().filter(|j| *j == i).count() > 1)
                .unwrap_or(0);
            return Err(SelectionError::AlreadyGrouped(duplicated));
        }

        for &index in indices {
            self.individual.remove(&index);
        }

        let id = self.next_group_id;
        self.next_group_id += 1;
        self.groups.push(SceneGroup {
            id,
            members: indices.to_vec(),
        });
        Ok(id)
    }

    /// 解散群組，成員回到「未選取」狀態
    pub fn ungroup(&mut self, group_id: usize) -> Result<(), SelectionError> {
        let position = self
            .groups
            .iter()
            .position(|g| g.id == group_id)
            .ok_or(SelectionError::UnknownGroup(group_id))?;
        self.groups.remove(position);
        Ok(())
    }

    /// 剪輯工作單位，依單元內最小場景編號排序
    #[must_use]
    pub fn clip_units(&self) -> Vec<ClipUnit> {
        let mut units: Vec<ClipUnit> = self
            .individual
            .iter()
            .map(|&index| ClipUnit::Single(index))
            .chain(self.groups.iter().map(|g| ClipUnit::Group {
                id: g.id,
                members: g.members.clone(),
            }))
            .collect();
        units.sort_by_key(ClipUnit::first_scene);
        units
    }

    /// 所有被任何單元觸及的場景編號，升冪去重
    #[must_use]
    pub fn stills_scope(&self) -> Vec<usize> {
        let mut scope: BTreeSet<usize> = self.individual.clone();
        for group in &self.groups {
            scope.extend(group.members.iter().copied());
        }
        scope.into_iter().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.individual.is_empty() && self.groups.is_empty()
    }

    #[must_use]
    pub fn individual_indices(&self) -> Vec<usize> {
        self.individual.iter().copied().collect()
    }

    #[must_use]
    pub fn groups(&self) -> &[SceneGroup] {
        &self.groups
    }
}
