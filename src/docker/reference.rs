//! Docker 이미지 레퍼런스 파서
//!
//! `nginx`, `nginx:1.25`, `quay.io/org/app@sha256:...` 같은 familiar name을
//! 레지스트리 도메인, 리포지토리, 태그로 분해합니다.

use std::fmt;
use url::Url;

pub const DEFAULT_DOMAIN: &str = "docker.io";
pub const DEFAULT_TAG: &str = "latest";
const LEGACY_DEFAULT_DOMAIN: &str = "index.docker.io";
const OFFICIAL_REPO_PREFIX: &str = "library/";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("이미지 레퍼런스가 비어 있습니다")]
    Empty,

    #[error("잘못된 이미지 레퍼런스: {0}")]
    InvalidFormat(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// 레지스트리 도메인 (기본값 docker.io)
    pub domain: String,
    /// 도메인을 제외한 리포지토리 경로
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageReference {
    pub fn parse(reference: &str) -> Result<Self, ReferenceError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ReferenceError::Empty);
        }

        let (name_and_tag, digest) = match reference.split_once('@') {
            Some((name, digest)) if !digest.is_empty() => (name, Some(digest.to_string())),
            Some(_) => return Err(ReferenceError::InvalidFormat(reference.to_string())),
            None => (reference, None),
        };

        // 태그는 마지막 '/' 이후의 ':' 뒤에만 올 수 있음 (localhost:5000/app 구분)
        let (name, tag) = match name_and_tag.rfind(':') {
            Some(idx) if !name_and_tag[idx..].contains('/') => {
                let tag = &name_and_tag[idx + 1..];
                if tag.is_empty() {
                    return Err(ReferenceError::InvalidFormat(reference.to_string()));
                }
                (&name_and_tag[..idx], Some(tag.to_string()))
            }
            _ => (name_and_tag, None),
        };

        let (domain, remainder) = split_domain(name);
        let domain = if domain == LEGACY_DEFAULT_DOMAIN { DEFAULT_DOMAIN } else { domain };

        if remainder.is_empty()
            || remainder.split('/').any(str::is_empty)
            || remainder.chars().any(|c| c.is_ascii_uppercase())
        {
            return Err(ReferenceError::InvalidFormat(reference.to_string()));
        }

        let repository = if domain == DEFAULT_DOMAIN && !remainder.contains('/') {
            format!("{}{}", OFFICIAL_REPO_PREFIX, remainder)
        } else {
            remainder.to_string()
        };

        Ok(Self {
            domain: domain.to_string(),
            repository,
            tag,
            digest,
        })
    }

    /// `POST /images/create`의 `fromImage`/`tag` 쿼리 파라미터로부터 레퍼런스를 만듭니다.
    pub fn from_pull_params(url: &Url) -> Option<Result<Self, ReferenceError>> {
        let mut from_image = None;
        let mut tag = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "fromImage" => from_image = Some(value.into_owned()),
                "tag" => tag = Some(value.into_owned()),
                _ => {}
            }
        }

        let from_image = from_image.filter(|image| !image.is_empty())?;
        let requested = match tag.filter(|tag| !tag.is_empty()) {
            Some(tag) if tag.contains(':') => format!("{}@{}", from_image, tag),
            Some(tag) => format!("{}:{}", from_image, tag),
            None => from_image,
        };

        Some(Self::parse(&requested))
    }

    /// 태그가 없으면 `latest`로 간주합니다.
    pub fn resolved_tag(&self) -> &str {
        self.tag.as_deref().unwrap_or(DEFAULT_TAG)
    }

    /// 리포지토리의 마지막 구성요소를 제외한 경로 (`library/nginx` -> `library`)
    pub fn namespace(&self) -> String {
        match self.repository.rsplit_once('/') {
            Some((namespace, _)) => namespace.to_string(),
            None => String::new(),
        }
    }

    /// 레지스트리, 리포지토리, 해석된 태그가 모두 같아야 일치합니다.
    pub fn matches(&self, other: &ImageReference) -> bool {
        self.domain == other.domain
            && self.repository == other.repository
            && self.resolved_tag() == other.resolved_tag()
            && self.digest == other.digest
    }

    /// 도메인과 `library/` 접두사를 생략한 짧은 이름
    pub fn familiar_name(&self) -> String {
        if self.domain == DEFAULT_DOMAIN {
            self.repository
                .strip_prefix(OFFICIAL_REPO_PREFIX)
                .unwrap_or(&self.repository)
                .to_string()
        } else {
            format!("{}/{}", self.domain, self.repository)
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.familiar_name())?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

fn split_domain(name: &str) -> (&str, &str) {
    match name.split_once('/') {
        Some((first, rest))
            if first.contains('.')
                || first.contains(':')
                || first == "localhost"
                || first.chars().any(|c| c.is_ascii_uppercase()) =>
        {
            (first, rest)
        }
        _ => (DEFAULT_DOMAIN, name),
    }
}
