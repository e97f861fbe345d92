//! トークナイザ + 分類器: 入力行から構造化コマンド [`CommandLine`] を構築する。
//!
//! 空白（スペース/タブ）区切りのトークン列を作り、演算子を解釈して
//! 実行前に不変な値へ変換する。executor はトークン列を書き換えず、この値だけを見る。
//!
//! ## 対応構文
//!
//! - パイプ: `cmd1 | cmd2`（2 段のみ。2 個目以降の `|` は右側コマンドの引数としてそのまま残る）
//! - リダイレクト: `>`（stdout を作成/切り詰め）、`<`（stdin をファイルから読み取り）
//! - バックグラウンド実行: 行末の `&`
//!
//! クォート、エスケープ、変数展開、glob は扱わない。演算子は独立したトークンのときだけ認識する
//! （`a>b` は 1 個の引数）。

use thiserror::Error;

/// パイプ演算子。
pub const PIPE: &str = "|";
/// stdout リダイレクト演算子。
pub const REDIRECT_OUT: &str = ">";
/// stdin リダイレクト演算子。
pub const REDIRECT_IN: &str = "<";
/// バックグラウンド実行マーカー（行末のみ有効）。
pub const BACKGROUND: &str = "&";

// ── Error ───────────────────────────────────────────────────────────

/// パース時に発生しうるエラー。いずれも fork 前に検出され、コマンドは実行されない。
#[derive(Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    /// トークン数が設定された上限を超えた。
    #[error("too many arguments (limit is {limit})")]
    TooManyArguments { limit: usize },
    /// リダイレクト演算子の後にファイル名がない。
    #[error("syntax error: missing file name after `{0}`")]
    MissingRedirectTarget(&'static str),
    /// パイプの左右どちらかにコマンドがない。
    #[error("syntax error near unexpected token `|`")]
    EmptyPipelineSegment,
    /// 演算子を除くとプログラム名が残らない（`&` のみ、`> out` のみ等）。
    #[error("syntax error: missing command")]
    MissingCommand,
}

// ── Tokenizer ───────────────────────────────────────────────────────

/// 1 行をトークン列に分割する。
///
/// トークンはスペース/タブ（と、呼び出し側が除去し忘れた改行）を含まない最大の文字列。
/// 全て空白の行は空ベクタになる。`limit` が `Some(n)` ならトークン数が `n` を超えた時点でエラー。
pub fn tokenize(line: &str, limit: Option<usize>) -> Result<Vec<&str>, ParseError> {
    let mut tokens = Vec::new();
    for token in line.split([' ', '\t', '\n']).filter(|t| !t.is_empty()) {
        if let Some(limit) = limit {
            if tokens.len() == limit {
                return Err(ParseError::TooManyArguments { limit });
            }
        }
        tokens.push(token);
    }
    Ok(tokens)
}

// ── Classifier ──────────────────────────────────────────────────────

/// `|` トークンを含むか。
pub fn has_pipe(args: &[&str]) -> bool {
    args.iter().any(|&a| a == PIPE)
}

/// `<` または `>` トークンを含むか。
pub fn has_redirection(args: &[&str]) -> bool {
    args.iter().any(|&a| RedirectKind::from_token(a).is_some())
}

/// 最後のトークンが `&` か。空ベクタは false。
pub fn is_background(args: &[&str]) -> bool {
    args.last() == Some(&BACKGROUND)
}

/// 末尾の `&` を取り除いたスライスを返す。`&` がなければそのまま返す。
pub fn strip_background<'b, 'a>(args: &'b [&'a str]) -> &'b [&'a str] {
    if is_background(args) {
        &args[..args.len() - 1]
    } else {
        args
    }
}

/// 最初の `|` で左右に分割する。`|` がなければ `None`。
pub fn split_pipe<'b, 'a>(args: &'b [&'a str]) -> Option<(&'b [&'a str], &'b [&'a str])> {
    let pos = args.iter().position(|&a| a == PIPE)?;
    Some((&args[..pos], &args[pos + 1..]))
}

// ── 構造化コマンド ──────────────────────────────────────────────────

/// リダイレクトの種別。
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RedirectKind {
    /// `<` — stdin をファイルから読み取り
    Input,
    /// `>` — stdout を作成/切り詰め（mode 0644）
    Output,
}

impl RedirectKind {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            REDIRECT_IN => Some(Self::Input),
            REDIRECT_OUT => Some(Self::Output),
            _ => None,
        }
    }

    /// 演算子の表記。
    pub fn operator(self) -> &'static str {
        match self {
            Self::Input => REDIRECT_IN,
            Self::Output => REDIRECT_OUT,
        }
    }

    /// 付け替え先の fd（`STDIN_FILENO` / `STDOUT_FILENO`）。
    pub fn target_fd(self) -> i32 {
        match self {
            Self::Input => libc::STDIN_FILENO,
            Self::Output => libc::STDOUT_FILENO,
        }
    }
}

/// ファイルリダイレクト指定。
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Redirect {
    pub kind: RedirectKind,
    pub target: String,
}

/// 単一コマンド。`args[0]` がプログラム名で、`args` は常に 1 要素以上。
///
/// `redirects` は出現順に並び、子プロセス内で先頭から順に適用される（同じ fd なら最後が勝つ）。
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Command {
    pub args: Vec<String>,
    pub redirects: Vec<Redirect>,
}

impl Command {
    /// プログラム名。
    pub fn program(&self) -> &str {
        &self.args[0]
    }
}

/// 実行段。パイプは 2 段まで。
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Stages {
    Single(Command),
    Pipe(Command, Command),
}

/// 1 行分のパース結果。
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct CommandLine {
    pub stages: Stages,
    /// 行末に `&` があった場合に `true`。パイプと組み合わせた場合 executor は無視する。
    pub background: bool,
}

/// トークン列からリダイレクトを抜き出し、残りを引数リストとする。
///
/// 演算子と直後のファイル名トークンだけを取り除き、それ以外のトークンは元の順序で残す。
/// 最初の演算子で argv を打ち切る実装とは異なり、`echo a > f b` は `echo a b` として実行される。
pub fn extract_redirects(args: &[&str]) -> Result<Command, ParseError> {
    if !has_redirection(args) {
        if args.is_empty() {
            return Err(ParseError::MissingCommand);
        }
        return Ok(Command {
            args: args.iter().map(|a| a.to_string()).collect(),
            redirects: Vec::new(),
        });
    }

    let mut plain = Vec::with_capacity(args.len());
    let mut redirects = Vec::new();
    let mut iter = args.iter();

    while let Some(&token) = iter.next() {
        match RedirectKind::from_token(token) {
            Some(kind) => {
                let target = iter
                    .next()
                    .ok_or(ParseError::MissingRedirectTarget(kind.operator()))?;
                redirects.push(Redirect {
                    kind,
                    target: target.to_string(),
                });
            }
            None => plain.push(token.to_string()),
        }
    }

    if plain.is_empty() {
        return Err(ParseError::MissingCommand);
    }
    Ok(Command {
        args: plain,
        redirects,
    })
}

/// トークン列（ビルトイン判定済み）を [`CommandLine`] に変換する。
///
/// 判定順序は固定: まず末尾 `&` を取り除き、残りに対してパイプとリダイレクトを解釈する。
pub fn parse_command(args: &[&str]) -> Result<CommandLine, ParseError> {
    let background = is_background(args);
    let rest = strip_background(args);
    if rest.is_empty() {
        return Err(ParseError::MissingCommand);
    }

    let split = if has_pipe(rest) { split_pipe(rest) } else { None };
    let stages = match split {
        Some((left, right)) => {
            if left.is_empty() || right.is_empty() {
                return Err(ParseError::EmptyPipelineSegment);
            }
            Stages::Pipe(extract_redirects(left)?, extract_redirects(right)?)
        }
        None => Stages::Single(extract_redirects(rest)?),
    };

    Ok(CommandLine { stages, background })
}
