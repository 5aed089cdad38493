use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::gateway::DEFAULT_API_URL;
use crate::view::{
  FilterMode,
  SortMode,
  ViewQuery
};

pub const TODORC_ENV_VAR: &str =
  "TODORC";
pub const API_URL_ENV_VAR: &str =
  "TODO_API_URL";

#[derive(Debug, Clone)]
pub struct Config {
  map:              HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    for (key, value) in [
      ("api.url", DEFAULT_API_URL),
      ("data.location", "~/.todo"),
      ("color", "on"),
      ("default.sort", "created"),
      ("default.filter", "all")
    ] {
      map.insert(
        key.to_string(),
        value.to_string()
      );
    }

    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    todorc_override
  ))]
  pub fn load(
    todorc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let todorc = resolve_todorc_path(
      todorc_override
    )?;
    if let Some(path) = todorc {
      info!(todorc = %path.display(), "loading todorc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no todorc found; using \
         defaults"
      );
    }

    if let Ok(url) =
      std::env::var(API_URL_ENV_VAR)
      && !url.trim().is_empty()
    {
      debug!(url = %url, "api url from environment");
      cfg.map.insert(
        "api.url".to_string(),
        url.trim().to_string()
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  /// Base address of the API, without a trailing slash.
  pub fn api_url(&self) -> String {
    self
      .get("api.url")
      .map(|url| {
        url
          .trim()
          .trim_end_matches('/')
          .to_string()
      })
      .filter(|url| !url.is_empty())
      .unwrap_or_else(|| {
        DEFAULT_API_URL.to_string()
      })
  }

  pub fn color_enabled(
    &self
  ) -> anyhow::Result<bool> {
    let raw = self
      .get("color")
      .unwrap_or_else(|| {
        "on".to_string()
      });
    parse_bool(&raw).ok_or_else(|| {
      anyhow!(
        "invalid color setting: {raw}"
      )
    })
  }

  /// View defaults from `default.filter` and `default.sort`.
  pub fn default_query(
    &self
  ) -> anyhow::Result<ViewQuery> {
    let filter = match self
      .get("default.filter")
    {
      | Some(raw) => raw
        .parse::<FilterMode>()
        .context(
          "invalid default.filter"
        )?,
      | None => FilterMode::default()
    };
    let sort =
      match self.get("default.sort") {
        | Some(raw) => raw
          .parse::<SortMode>()
          .context(
            "invalid default.sort"
          )?,
        | None => SortMode::default()
      };

    Ok(ViewQuery {
      search: String::new(),
      filter,
      sort
    })
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    let canonical = fs::canonicalize(&path)
      .unwrap_or_else(|_| path.clone());
    self.loaded_files.push(canonical);

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        let Ok(canonical_include) =
          fs::canonicalize(&include_path)
        else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
          continue;
        };
        if self
          .loaded_files
          .contains(&canonical_include)
        {
          warn!(include = %include_path.display(), "include cycle; skipping");
          continue;
        }
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        self.load_file(&canonical_include)?;
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_todorc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(todorc_env) =
    std::env::var(TODORC_ENV_VAR)
  {
    if todorc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      todorc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping todorc"
    );
    return Ok(None);
  };
  let candidate = home.join(".todorc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".todo"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> Option<bool> {
  match s
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Some(true),
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::tempdir;

  use super::Config;
  use crate::view::{
    FilterMode,
    SortMode
  };

  #[test]
  fn file_values_and_includes_load() {
    let temp =
      tempdir().expect("tempdir");
    let extra = temp.path().join("extra");
    fs::write(
      &extra,
      "default.sort = priority\n"
    )
    .expect("write include");
    let rc = temp.path().join("todorc");
    fs::write(
      &rc,
      "# client settings\napi.url = \
       https://todo.example.com/  # \
       prod\ninclude extra\ncolor=off\n"
    )
    .expect("write todorc");

    let cfg = Config::load(Some(&rc))
      .expect("load config");

    assert_eq!(
      cfg.get("api.url").as_deref(),
      Some("https://todo.example.com/")
    );
    assert!(
      !cfg
        .color_enabled()
        .expect("color")
    );
    let query = cfg
      .default_query()
      .expect("query");
    assert_eq!(
      query.sort,
      SortMode::Priority
    );
    assert_eq!(
      query.filter,
      FilterMode::All
    );
    assert_eq!(cfg.loaded_files.len(), 2);
  }

  #[test]
  fn include_cycle_through_alternate_spelling_stops()
  {
    let temp =
      tempdir().expect("tempdir");
    let a = temp.path().join("a");
    let b = temp.path().join("b");
    fs::write(
      &a,
      "color = off\ninclude ./b\n"
    )
    .expect("write a");
    fs::write(
      &b,
      "default.sort = alphabetical\ninclude \
       ./././a\ninclude b\n"
    )
    .expect("write b");

    let cfg = Config::load(Some(&a))
      .expect("load config");

    assert_eq!(cfg.loaded_files.len(), 2);
    assert_eq!(
      cfg
        .default_query()
        .expect("query")
        .sort,
      SortMode::Alphabetical
    );
    assert!(
      !cfg
        .color_enabled()
        .expect("color")
    );
  }

  #[test]
  fn overrides_strip_rc_prefix() {
    let mut cfg = Config::default();
    cfg.apply_overrides([(
      "rc.api.url".to_string(),
      "http://127.0.0.1:9000/"
        .to_string()
    )]);
    assert_eq!(
      cfg.api_url(),
      "http://127.0.0.1:9000"
    );
  }

  #[test]
  fn invalid_lines_are_rejected() {
    let temp =
      tempdir().expect("tempdir");
    let rc = temp.path().join("todorc");
    fs::write(&rc, "just words\n")
      .expect("write todorc");
    assert!(Config::load(Some(&rc)).is_err());
  }

  #[test]
  fn bad_color_value_is_an_error() {
    let mut cfg = Config::default();
    cfg.apply_overrides([(
      "color".to_string(),
      "sometimes".to_string()
    )]);
    assert!(cfg.color_enabled().is_err());
  }
}
