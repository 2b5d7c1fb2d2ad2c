use async_trait::async_trait;

use super::{fetch_sections, fetch_window_id, ResolveContext, SectionInfo};
use crate::conf::Settings;
use crate::error::SelectionError;

/// 开课类型代码：公选课 10，体育课 05，主修课程 01
pub const COURSE_TYPE_PUBLIC_CHOICE: &str = "10";
pub const COURSE_TYPE_PHYSICAL_EDUCATION: &str = "05";
pub const COURSE_TYPE_MAJOR: &str = "01";

/// 选课协议里的可变步骤：解析选课时段 id 与教学班 ids
///
/// 固定骨架（prepare -> simulate_request -> 解释结果）不可覆盖，
/// 各课程类别只在这两步上有差异。
#[async_trait]
pub trait CategoryResolver: Send + Sync {
    /// 开课类型代码（kklxdm）
    fn course_type(&self) -> &'static str;

    /// 解析本类别的选课时段 id（xkkz_id）
    async fn resolve_window_id(&self, ctx: &ResolveContext<'_>) -> Result<String, SelectionError>;

    /// 解析目标课程的教学班 ids（jxb_ids，逗号拼接）
    async fn resolve_section_ids(
        &self,
        ctx: &ResolveContext<'_>,
        xkkz_id: &str,
    ) -> Result<String, SelectionError>;
}

/// 公选课（通识选修）选课器步骤
pub struct PublicChoiceResolver;

#[async_trait]
impl CategoryResolver for PublicChoiceResolver {
    fn course_type(&self) -> &'static str {
        COURSE_TYPE_PUBLIC_CHOICE
    }

    async fn resolve_window_id(&self, ctx: &ResolveContext<'_>) -> Result<String, SelectionError> {
        fetch_window_id(ctx, self.course_type()).await
    }

    async fn resolve_section_ids(
        &self,
        ctx: &ResolveContext<'_>,
        xkkz_id: &str,
    ) -> Result<String, SelectionError> {
        let sections = fetch_sections(ctx, self.course_type(), xkkz_id).await?;
        join_all_sections(&sections)
    }
}

/// 体育课选课器步骤：教学班要按分组关键字（校区/年级）过滤
pub struct PhysicalEducationResolver {
    group_keyword: String,
}

impl PhysicalEducationResolver {
    pub fn new(group_keyword: &str) -> Self {
        Self {
            group_keyword: group_keyword.to_string(),
        }
    }

    /// 从候选教学班里挑出本组可选的那一个
    pub fn pick_section(&self, sections: &[SectionInfo]) -> Option<SectionInfo> {
        if self.group_keyword.is_empty() {
            return sections.first().cloned();
        }
        sections
            .iter()
            .find(|s| s.name.contains(&self.group_keyword))
            .cloned()
    }
}

#[async_trait]
impl CategoryResolver for PhysicalEducationResolver {
    fn course_type(&self) -> &'static str {
        COURSE_TYPE_PHYSICAL_EDUCATION
    }

    async fn resolve_window_id(&self, ctx: &ResolveContext<'_>) -> Result<String, SelectionError> {
        fetch_window_id(ctx, self.course_type()).await
    }

    async fn resolve_section_ids(
        &self,
        ctx: &ResolveContext<'_>,
        xkkz_id: &str,
    ) -> Result<String, SelectionError> {
        let sections = fetch_sections(ctx, self.course_type(), xkkz_id).await?;
        self.pick_section(&sections)
            .map(|s| s.do_jxb_id)
            .ok_or_else(|| {
                SelectionError::UpstreamShape(format!(
                    "没有匹配分组 {} 的体育教学班",
                    self.group_keyword
                ))
            })
    }
}

/// 主修课程（英语、思政类）选课器步骤
pub struct MajorResolver;

#[async_trait]
impl CategoryResolver for MajorResolver {
    fn course_type(&self) -> &'static str {
        COURSE_TYPE_MAJOR
    }

    async fn resolve_window_id(&self, ctx: &ResolveContext<'_>) -> Result<String, SelectionError> {
        fetch_window_id(ctx, self.course_type()).await
    }

    async fn resolve_section_ids(
        &self,
        ctx: &ResolveContext<'_>,
        xkkz_id: &str,
    ) -> Result<String, SelectionError> {
        let sections = fetch_sections(ctx, self.course_type(), xkkz_id).await?;
        join_all_sections(&sections)
    }
}

fn join_all_sections(sections: &[SectionInfo]) -> Result<String, SelectionError> {
    if sections.is_empty() {
        return Err(SelectionError::UpstreamShape(
            "目标课程没有可选教学班".to_string(),
        ));
    }
    Ok(sections
        .iter()
        .map(|s| s.do_jxb_id.as_str())
        .collect::<Vec<_>>()
        .join(","))
}

/// 按开课类型代码分派到具体选课器步骤
pub enum AnyResolver {
    PublicChoice(PublicChoiceResolver),
    PhysicalEducation(PhysicalEducationResolver),
    Major(MajorResolver),
}

impl AnyResolver {
    pub fn from_course_type(course_type: &str, settings: &Settings) -> Result<Self, SelectionError> {
        match course_type {
            COURSE_TYPE_PUBLIC_CHOICE => Ok(Self::PublicChoice(PublicChoiceResolver)),
            COURSE_TYPE_PHYSICAL_EDUCATION => Ok(Self::PhysicalEducation(
                PhysicalEducationResolver::new(&settings.pe_group_keyword),
            )),
            COURSE_TYPE_MAJOR => Ok(Self::Major(MajorResolver)),
            other => Err(SelectionError::Submission(format!(
                "未知的开课类型代码: {}",
                other
            ))),
        }
    }
}

#[async_trait]
impl CategoryResolver for AnyResolver {
    fn course_type(&self) -> &'static str {
        match self {
            Self::PublicChoice(r) => r.course_type(),
            Self::PhysicalEducation(r) => r.course_type(),
            Self::Major(r) => r.course_type(),
        }
    }

    async fn resolve_window_id(&self, ctx: &ResolveContext<'_>) -> Result<String, SelectionError> {
        match self {
            Self::PublicChoice(r) => r.resolve_window_id(ctx).await,
            Self::PhysicalEducation(r) => r.resolve_window_id(ctx).await,
            Self::Major(r) => r.resolve_window_id(ctx).await,
        }
    }

    async fn resolve_section_ids(
        &self,
        ctx: &ResolveContext<'_>,
        xkkz_id: &str,
    ) -> Result<String, SelectionError> {
        match self {
            Self::PublicChoice(r) => r.resolve_section_ids(ctx, xkkz_id).await,
            Self::PhysicalEducation(r) => r.resolve_section_ids(ctx, xkkz_id).await,
            Self::Major(r) => r.resolve_section_ids(ctx, xkkz_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(id: &str, name: &str) -> SectionInfo {
        SectionInfo {
            do_jxb_id: id.to_string(),
            name: name.to_string(),
            selected_count: 0,
            capacity: 40,
        }
    }

    #[test]
    fn test_pe_picks_matching_group() {
        let resolver = PhysicalEducationResolver::new("南校区");
        let sections = vec![
            section("jxb-1", "羽毛球-北校区-01班"),
            section("jxb-2", "羽毛球-南校区-02班"),
        ];
        let picked = resolver.pick_section(&sections).expect("应有匹配教学班");
        assert_eq!(picked.do_jxb_id, "jxb-2");
    }

    #[test]
    fn test_pe_without_keyword_takes_first() {
        let resolver = PhysicalEducationResolver::new("");
        let sections = vec![section("jxb-1", "篮球-01班"), section("jxb-2", "篮球-02班")];
        let picked = resolver.pick_section(&sections).expect("应取第一个");
        assert_eq!(picked.do_jxb_id, "jxb-1");
    }

    #[test]
    fn test_join_all_sections() {
        let sections = vec![section("jxb-1", "a"), section("jxb-2", "b")];
        assert_eq!(join_all_sections(&sections).unwrap(), "jxb-1,jxb-2");
        assert!(join_all_sections(&[]).is_err());
    }

    #[test]
    fn test_variant_course_types() {
        let settings = crate::conf::Settings::from_env();
        let pc = AnyResolver::from_course_type("10", &settings).unwrap();
        assert_eq!(pc.course_type(), "10");
        let pe = AnyResolver::from_course_type("05", &settings).unwrap();
        assert_eq!(pe.course_type(), "05");
        let major = AnyResolver::from_course_type("01", &settings).unwrap();
        assert_eq!(major.course_type(), "01");
        assert!(AnyResolver::from_course_type("99", &settings).is_err());
    }
}
