// User-facing text: error messages and fixed summaries in zh-CN / en-US.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ErrorKind;
use crate::model::{CategoryMap, CategoryStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Locale {
    #[default]
    #[serde(rename = "zh-CN")]
    ZhCn,
    #[serde(rename = "en-US")]
    EnUs,
}

impl Locale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::ZhCn => "zh-CN",
            Locale::EnUs => "en-US",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zh" | "zh-cn" | "zh_cn" => Ok(Locale::ZhCn),
            "en" | "en-us" | "en_us" => Ok(Locale::EnUs),
            other => Err(format!("unknown locale '{}' (expected zh-CN or en-US)", other)),
        }
    }
}

/// Short message for an error kind
pub fn user_message(kind: ErrorKind, locale: Locale) -> &'static str {
    match (locale, kind) {
        (Locale::ZhCn, ErrorKind::InputMissing) => "请先选择两个文件并输入API密钥",
        (Locale::ZhCn, ErrorKind::FileUnreadable) => "文件解析错误",
        (Locale::ZhCn, ErrorKind::StructureUnresolved) => "数据验证失败：无法识别名称或金额列",
        (Locale::ZhCn, ErrorKind::RemoteCallFailed) => "API调用失败",
        (Locale::ZhCn, ErrorKind::ResponseUnparseable) => "AI返回内容无法解析",
        (Locale::EnUs, ErrorKind::InputMissing) => "Select both files and enter an API key first",
        (Locale::EnUs, ErrorKind::FileUnreadable) => "File parsing error",
        (Locale::EnUs, ErrorKind::StructureUnresolved) => {
            "Data validation failed: name or amount column not found"
        }
        (Locale::EnUs, ErrorKind::RemoteCallFailed) => "API call failed",
        (Locale::EnUs, ErrorKind::ResponseUnparseable) => "The AI response could not be parsed",
    }
}

pub fn status_label(status: CategoryStatus, locale: Locale) -> &'static str {
    match (locale, status) {
        (Locale::ZhCn, CategoryStatus::Match) => "一致",
        (Locale::ZhCn, CategoryStatus::Mismatch) => "不一致",
        (Locale::ZhCn, CategoryStatus::Missing) => "缺失",
        (Locale::EnUs, CategoryStatus::Match) => "match",
        (Locale::EnUs, CategoryStatus::Mismatch) => "mismatch",
        (Locale::EnUs, CategoryStatus::Missing) => "missing",
    }
}

/// Status counts after classification
pub fn classification_summary(categories: &CategoryMap, locale: Locale) -> String {
    let count = |status| categories.values().filter(|c| c.status == status).count();
    let (matched, mismatched, missing) = (
        count(CategoryStatus::Match),
        count(CategoryStatus::Mismatch),
        count(CategoryStatus::Missing),
    );

    match locale {
        Locale::ZhCn => format!(
            "AI已将财务条目分为{}个类别。其中：\n- {}个类别金额完全一致\n- {}个类别存在金额差异\n- {}个类别数据缺失\n\n建议人工检查存在差异的类别，并调整分类结果以获得更准确的对账结果。",
            categories.len(),
            matched,
            mismatched,
            missing
        ),
        Locale::EnUs => format!(
            "Entries were grouped into {} categories:\n- {} match exactly\n- {} have amount differences\n- {} are missing on one side\n\nReview the mismatched categories and adjust the grouping for a more accurate reconciliation.",
            categories.len(),
            matched,
            mismatched,
            missing
        ),
    }
}

/// Summary used when the classification reply could not be used at all
pub fn fallback_summary(locale: Locale) -> &'static str {
    match locale {
        Locale::ZhCn => "AI返回的分类结果无法解析，所有条目已归入“未分类”。请手动调整分类。",
        Locale::EnUs => {
            "The AI classification could not be parsed; every entry was placed in \"Unclassified\". Please regroup them manually."
        }
    }
}
