use crate::host::FileInfo;
use serde::Serialize;
use std::collections::BTreeMap;

/// 单个文件的比较分类
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// 两侧内容一致
    Match,
    /// 仅源端存在
    MissingTarget,
    /// 仅目标端存在
    MissingSource,
    /// 两侧不同，源端更新
    NewerSource,
    /// 两侧不同，目标端更新
    NewerTarget,
    /// 两侧不同且无可靠的新旧信号
    Conflict,
}

/// 文件比较结果（路径相对于挂载根目录）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCompareResult {
    pub path: String,
    pub status: FileStatus,
    pub source_meta: Option<FileInfo>,
    pub target_meta: Option<FileInfo>,
}

/// 比较统计
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareSummary {
    pub match_count: usize,
    pub missing_target: usize,
    pub missing_source: usize,
    pub newer_source: usize,
    pub newer_target: usize,
    pub conflict: usize,
}

impl CompareSummary {
    pub fn total(&self) -> usize {
        self.match_count
            + self.missing_target
            + self.missing_source
            + self.newer_source
            + self.newer_target
            + self.conflict
    }
}

/// 判断两侧元数据是否内容一致。
/// 双方都有 checksum 时以 checksum 为准，否则用 大小+修改时间 启发式。
fn same_content(source: &FileInfo, target: &FileInfo) -> bool {
    if source.size != target.size {
        return false;
    }
    if let (Some(src_sum), Some(dst_sum)) = (&source.checksum, &target.checksum) {
        return src_sum == dst_sum;
    }
    source.modified_time == target.modified_time
}

/// 比较一个挂载两侧的文件列表，纯函数：相同输入必得相同输出，无时钟无 IO。
///
/// 分类规则按顺序求值：
/// 1. 两侧都有且内容一致 -> Match
/// 2. 仅源端 -> MissingTarget
/// 3. 仅目标端 -> MissingSource
/// 4. 内容不同，源端 mtime 严格更新 -> NewerSource
/// 5. 内容不同，目标端 mtime 严格更新 -> NewerTarget
/// 6. 内容不同，mtime 相等或 checksum 无法定序 -> Conflict
pub fn compare_file_lists(
    source_files: &[FileInfo],
    target_files: &[FileInfo],
) -> Vec<FileCompareResult> {
    // BTreeMap 保证输出按路径有序，与输入顺序无关
    let mut union: BTreeMap<&str, (Option<&FileInfo>, Option<&FileInfo>)> = BTreeMap::new();

    for file in source_files {
        union.entry(file.path.as_str()).or_default().0 = Some(file);
    }
    for file in target_files {
        union.entry(file.path.as_str()).or_default().1 = Some(file);
    }

    union
        .into_iter()
        .map(|(path, sides)| {
            let status = match sides {
                (Some(src), Some(dst)) => {
                    if same_content(src, dst) {
                        FileStatus::Match
                    } else if src.modified_time > dst.modified_time {
                        FileStatus::NewerSource
                    } else if dst.modified_time > src.modified_time {
                        FileStatus::NewerTarget
                    } else {
                        FileStatus::Conflict
                    }
                }
                (Some(_), None) => FileStatus::MissingTarget,
                (None, Some(_)) => FileStatus::MissingSource,
                (None, None) => unreachable!(),
            };

            FileCompareResult {
                path: path.to_string(),
                status,
                source_meta: sides.0.cloned(),
                target_meta: sides.1.cloned(),
            }
        })
        .collect()
}

/// 统计比较结果
pub fn summarize(results: &[FileCompareResult]) -> CompareSummary {
    let mut summary = CompareSummary::default();

    for result in results {
        match result.status {
            FileStatus::Match => summary.match_count += 1,
            FileStatus::MissingTarget => summary.missing_target += 1,
            FileStatus::MissingSource => summary.missing_source += 1,
            FileStatus::NewerSource => summary.newer_source += 1,
            FileStatus::NewerTarget => summary.newer_target += 1,
            FileStatus::Conflict => summary.conflict += 1,
        }
    }

    summary
}
