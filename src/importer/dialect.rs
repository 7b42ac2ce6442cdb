// ==========================================
// 商品导入系统 - 文件方言识别
// ==========================================
// 职责: 从字节样本识别 编码 / 分隔符 / 引号 / 转义 / 表头, 并估算行数
// 样本: 默认 10 KB / 50 个非空行
// 约束: 只读样本, 不消费数据流（识别结束后回到起点）
// ==========================================

use crate::config::ImportSettings;
use crate::importer::error::{ImportError, ImportResult};
use encoding_rs::{Encoding, UTF_8, WINDOWS_1251, WINDOWS_1252};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::{Read, Seek, SeekFrom};
use tracing::{debug, warn};

/// 分隔符候选（顺序即平局时的优先级）
pub const DELIMITER_CANDIDATES: [char; 5] = [',', ';', '\t', '|', ':'];

/// 引号候选
pub const QUOTE_CANDIDATES: [char; 2] = ['"', '\''];

/// 无表头时合成的列名前缀
pub const SYNTHETIC_HEADER_PREFIX: &str = "Колонка_";

// ==========================================
// Dialect - 方言描述
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dialect {
    /// encoding_rs 规范名（如 "UTF-8", "windows-1251"）; 工作簿为 "binary"
    pub encoding: String,
    pub delimiter: char,
    pub quote_char: char,
    /// 与 quote_char 相同表示“双写引号”转义
    pub escape_char: char,
    pub headers: Vec<String>,
    /// false = 表头为合成列名, 首行即数据
    pub has_header: bool,
    pub estimated_lines: u64,
    pub file_size: u64,
    pub sample_lines: usize,
    pub warnings: Vec<String>,
}

impl Dialect {
    /// 解析编码（未知名称回退 UTF-8）
    pub fn encoding(&self) -> &'static Encoding {
        Encoding::for_label(self.encoding.as_bytes()).unwrap_or(UTF_8)
    }

    pub fn uses_doubled_quote(&self) -> bool {
        self.escape_char == self.quote_char
    }

    /// 工作簿（XLS/XLSX）的方言描述
    pub fn workbook(headers: Vec<String>, estimated_lines: u64, file_size: u64) -> Self {
        Self {
            encoding: "binary".to_string(),
            delimiter: '\0',
            quote_char: '\0',
            escape_char: '\0',
            headers,
            has_header: true,
            estimated_lines,
            file_size,
            sample_lines: 0,
            warnings: Vec::new(),
        }
    }
}

// ==========================================
// DialectAnalyzer
// ==========================================
#[derive(Debug, Clone)]
pub struct DialectAnalyzer {
    sample_bytes: usize,
    sample_lines: usize,
}

impl Default for DialectAnalyzer {
    fn default() -> Self {
        Self::new(
            crate::config::import_settings::DEFAULT_SAMPLE_BYTES,
            crate::config::import_settings::DEFAULT_SAMPLE_LINES,
        )
    }
}

impl DialectAnalyzer {
    pub fn new(sample_bytes: usize, sample_lines: usize) -> Self {
        Self {
            sample_bytes: sample_bytes.max(1),
            sample_lines: sample_lines.max(1),
        }
    }

    pub fn from_settings(settings: &ImportSettings) -> Self {
        Self::new(settings.sample_bytes, settings.sample_lines)
    }

    /// 识别方言
    ///
    /// # 参数
    /// - source: 可定位的字节源（识别后回到起点）
    /// - settings: 显式覆写（delimiter / quote_char / escape_char / charset / header_row）
    ///
    /// # 返回
    /// - Err(EmptyFile): 样本中没有可解析的行
    pub fn analyze<R: Read + Seek>(
        &self,
        source: &mut R,
        settings: &ImportSettings,
    ) -> ImportResult<Dialect> {
        let file_size = source.seek(SeekFrom::End(0))?;
        source.seek(SeekFrom::Start(0))?;

        let mut sample = Vec::with_capacity(self.sample_bytes.min(file_size as usize));
        Read::take(&mut *source, self.sample_bytes as u64).read_to_end(&mut sample)?;
        source.seek(SeekFrom::Start(0))?;

        let truncated = (sample.len() as u64) < file_size;
        self.analyze_sample(&sample, file_size, truncated, settings)
    }

    fn analyze_sample(
        &self,
        sample: &[u8],
        file_size: u64,
        truncated: bool,
        settings: &ImportSettings,
    ) -> ImportResult<Dialect> {
        let mut warnings = Vec::new();

        // 1. 编码
        let detected = detect_encoding(sample);
        let encoding = match settings.charset.as_deref() {
            Some(label) => {
                let explicit = Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| {
                    ImportError::DialectError(format!("不支持的字符集: {}", label))
                })?;
                if explicit != detected {
                    warnings.push(format!(
                        "指定字符集 {} 与识别结果 {} 不一致, 以指定值为准",
                        explicit.name(),
                        detected.name()
                    ));
                }
                explicit
            }
            None => detected,
        };

        let (decoded, _, _) = encoding.decode(sample);
        let mut text_lines: Vec<&str> = decoded.lines().collect();
        // 样本截断时末行可能不完整
        if truncated && text_lines.len() > 1 {
            text_lines.pop();
        }
        let lines: Vec<&str> = text_lines
            .into_iter()
            .filter(|l| !l.trim().is_empty())
            .take(self.sample_lines)
            .collect();

        if lines.is_empty() {
            return Err(ImportError::EmptyFile(
                "empty or unreadable file: 样本中没有可解析的行".to_string(),
            ));
        }

        // 2. 分隔符
        let detected_delimiter = detect_delimiter(&lines);
        let delimiter = match settings.delimiter {
            Some(explicit) => {
                if explicit != detected_delimiter {
                    warnings.push(format!(
                        "指定分隔符 {:?} 与识别结果 {:?} 不一致, 以指定值为准",
                        explicit, detected_delimiter
                    ));
                }
                explicit
            }
            None => detected_delimiter,
        };

        // 3. 引号 / 4. 转义
        let quote_char = settings
            .quote_char
            .unwrap_or_else(|| detect_quote_char(&lines, delimiter));
        let escape_char = settings
            .escape_char
            .unwrap_or_else(|| detect_escape_char(&lines, quote_char));

        // 5. 表头
        let header_index = settings.header_row.min(lines.len() - 1);
        let header_line = lines[header_index].trim_start_matches('\u{feff}');
        let tokens = tokenize_line(header_line, delimiter, quote_char, escape_char);
        let has_header = looks_like_header(&tokens);
        let headers = if has_header {
            let (headers, renamed) = disambiguate_headers(tokens);
            warnings.extend(renamed);
            headers
        } else {
            warnings.push("首行不像表头, 已合成列名".to_string());
            synthetic_headers(tokens.len())
        };

        // 6. 行数估算
        let estimated_lines = estimate_lines(sample, file_size, self.sample_lines);

        let dialect = Dialect {
            encoding: encoding.name().to_string(),
            delimiter,
            quote_char,
            escape_char,
            headers,
            has_header,
            estimated_lines,
            file_size,
            sample_lines: lines.len(),
            warnings,
        };

        for w in &dialect.warnings {
            warn!(warning = %w, "方言识别告警");
        }
        debug!(
            encoding = %dialect.encoding,
            delimiter = ?dialect.delimiter,
            quote = ?dialect.quote_char,
            columns = dialect.headers.len(),
            estimated_lines = dialect.estimated_lines,
            "方言识别完成"
        );
        Ok(dialect)
    }
}

// ==========================================
// 识别步骤
// ==========================================

/// 编码识别: 合法 UTF-8 直接采用; 否则 chardet 结果需通过首行无替换字符校验, 不通过时依次尝试 UTF-8 / windows-1251 / ISO-8859-1
pub fn detect_encoding(sample: &[u8]) -> &'static Encoding {
    if sample.starts_with(&[0xEF, 0xBB, 0xBF]) || is_utf8_prefix(sample) {
        return UTF_8;
    }

    let (charset, _, _) = chardet::detect(sample);
    let normalized = charset.to_lowercase();
    let candidate = match normalized.as_str() {
        "" => None,
        "ascii" | "utf-8" | "utf8" => Some(UTF_8),
        other => Encoding::for_label(other.as_bytes()),
    };

    if let Some(encoding) = candidate {
        if decodes_first_line_cleanly(sample, encoding) {
            return encoding;
        }
        debug!(charset = %charset, "chardet 结果未通过校验, 使用候选列表");
    }

    // ISO-8859-1 在 encoding_rs 中以 windows-1252 实现
    [UTF_8, WINDOWS_1251, WINDOWS_1252]
        .into_iter()
        .find(|enc| decodes_first_line_cleanly(sample, *enc))
        .unwrap_or(UTF_8)
}

/// 合法 UTF-8（允许样本末尾截断的多字节序列）
fn is_utf8_prefix(sample: &[u8]) -> bool {
    match std::str::from_utf8(sample) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}

fn decodes_first_line_cleanly(sample: &[u8], encoding: &'static Encoding) -> bool {
    let end = sample
        .iter()
        .position(|b| *b == b'\n')
        .unwrap_or(sample.len());
    let (text, _) = encoding.decode_without_bom_handling(&sample[..end]);
    !text.contains('\u{FFFD}')
}

/// 分隔符识别: score = 出现总数 * 10 + 与首行出现次数一致的行数
pub fn detect_delimiter(lines: &[&str]) -> char {
    let mut best = DELIMITER_CANDIDATES[0];
    let mut best_score = 0usize;

    for (idx, candidate) in DELIMITER_CANDIDATES.iter().enumerate() {
        let counts: Vec<usize> = lines.iter().map(|l| l.matches(*candidate).count()).collect();
        let total: usize = counts.iter().sum();
        let first = counts.first().copied().unwrap_or(0);
        let consistent = counts.iter().filter(|c| **c == first).count();
        let score = total * 10 + consistent;

        if idx == 0 || score > best_score {
            best = *candidate;
            best_score = score;
        }
    }
    best
}

/// 引号识别: 首个在任一样本行中包住整个字段的候选
pub fn detect_quote_char(lines: &[&str], delimiter: char) -> char {
    QUOTE_CANDIDATES
        .into_iter()
        .find(|quote| {
            lines.iter().any(|line| {
                line.split(delimiter).any(|field| {
                    let f = field.trim();
                    f.chars().count() >= 2 && f.starts_with(*quote) && f.ends_with(*quote)
                })
            })
        })
        .unwrap_or('"')
}

/// 转义识别: 双写引号 → 双写; 反斜杠+引号 → 反斜杠; 默认双写
pub fn detect_escape_char(lines: &[&str], quote_char: char) -> char {
    let doubled: String = [quote_char, quote_char].iter().collect();
    let backslashed: String = ['\\', quote_char].iter().collect();

    if lines.iter().any(|l| l.contains(&doubled)) {
        quote_char
    } else if lines.iter().any(|l| l.contains(&backslashed)) {
        '\\'
    } else {
        quote_char
    }
}

/// 单行分词（识别引号与转义）, 字段首尾空白去除
pub fn tokenize_line(line: &str, delimiter: char, quote_char: char, escape_char: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == escape_char && chars.peek() == Some(&quote_char) {
                // 双写引号或反斜杠转义
                field.push(quote_char);
                chars.next();
            } else if c == quote_char {
                in_quotes = false;
            } else {
                field.push(c);
            }
        } else if c == quote_char && field.trim().is_empty() {
            field.clear();
            in_quotes = true;
        } else if c == delimiter {
            fields.push(field.trim().to_string());
            field.clear();
        } else {
            field.push(c);
        }
    }
    fields.push(field.trim().to_string());
    fields
}

/// 表头启发式: 非数字、短于 50 字符、不是长驼峰串的字段各得 1 分, 得分 ≥ 列数一半即视为表头
pub fn looks_like_header(fields: &[String]) -> bool {
    if fields.is_empty() {
        return false;
    }
    let score = fields
        .iter()
        .filter(|f| {
            let f = f.trim();
            !f.is_empty() && !is_numeric(f) && f.chars().count() < 50 && !is_long_camel_case(f)
        })
        .count();
    score * 2 >= fields.len()
}

fn is_numeric(value: &str) -> bool {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    !compact.is_empty() && compact.parse::<f64>().is_ok()
}

fn is_long_camel_case(value: &str) -> bool {
    if value.chars().count() <= 20 || value.contains(char::is_whitespace) {
        return false;
    }
    value
        .chars()
        .zip(value.chars().skip(1))
        .any(|(a, b)| a.is_lowercase() && b.is_uppercase())
}

/// 重复表头从第二次出现起追加 `_N` 后缀
///
/// # 返回
/// - (去重后的表头, 每个被改名表头一条告警)
pub fn disambiguate_headers(headers: Vec<String>) -> (Vec<String>, Vec<String>) {
    // 改名不得与文件中已有的任一表头冲突
    let original: HashSet<String> = headers.iter().cloned().collect();
    let mut used: HashSet<String> = HashSet::with_capacity(headers.len());
    let mut warnings = Vec::new();
    let mut result = Vec::with_capacity(headers.len());
    for header in headers {
        // 空列名不参与映射, 保持原样
        if header.is_empty() || used.insert(header.clone()) {
            result.push(header);
            continue;
        }
        let mut n = 2;
        let renamed = loop {
            let candidate = format!("{}_{}", header, n);
            if !used.contains(&candidate) && !original.contains(&candidate) {
                break candidate;
            }
            n += 1;
        };
        warnings.push(format!("重复表头 {:?} 已重命名为 {:?}", header, renamed));
        used.insert(renamed.clone());
        result.push(renamed);
    }
    (result, warnings)
}

pub fn synthetic_headers(count: usize) -> Vec<String> {
    (1..=count)
        .map(|i| format!("{}{}", SYNTHETIC_HEADER_PREFIX, i))
        .collect()
}

/// 行数估算: round(文件大小 / (样本平均行字节数 + 2))
pub fn estimate_lines(sample: &[u8], file_size: u64, max_lines: usize) -> u64 {
    let lengths: Vec<usize> = sample
        .split(|b| *b == b'\n')
        .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
        .filter(|l| l.iter().any(|b| !b.is_ascii_whitespace()))
        .take(max_lines)
        .map(|l| l.len())
        .collect();

    if lengths.is_empty() {
        return 0;
    }
    let avg = lengths.iter().sum::<usize>() as f64 / lengths.len() as f64;
    (file_size as f64 / (avg + 2.0)).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn analyze(content: &[u8]) -> ImportResult<Dialect> {
        DialectAnalyzer::default().analyze(&mut Cursor::new(content), &ImportSettings::default())
    }

    #[test]
    fn test_semicolon_dialect() {
        let dialect = analyze("ID товара;Город;Цена\nA1;North;10,50\nA2;South;20,00\n".as_bytes())
            .unwrap();
        assert_eq!(dialect.delimiter, ';');
        assert_eq!(dialect.encoding, "UTF-8");
        assert_eq!(dialect.headers, vec!["ID товара", "Город", "Цена"]);
        assert!(dialect.has_header);
        assert_eq!(dialect.sample_lines, 3);
    }

    #[test]
    fn test_delimiter_detection_is_idempotent() {
        let lines = vec!["a|b|c", "1|2|3", "4|5|6"];
        let first = detect_delimiter(&lines);
        assert_eq!(first, '|');
        assert_eq!(detect_delimiter(&lines), first);
    }

    #[test]
    fn test_delimiter_tie_prefers_earlier_candidate() {
        // 无任何候选字符时得分相同, 取 ','
        assert_eq!(detect_delimiter(&["abc", "def"]), ',');
        // ',' 与 ';' 得分相同
        assert_eq!(detect_delimiter(&["a,b;c", "d,e;f"]), ',');
    }

    #[test]
    fn test_quote_and_escape_detection() {
        let lines = vec!["name,comment", "'x','it''s'"];
        assert_eq!(detect_quote_char(&lines, ','), '\'');
        assert_eq!(detect_escape_char(&lines, '\''), '\'');

        let lines = vec!["name,comment", r#""x","say \"hi\"""#];
        assert_eq!(detect_quote_char(&lines, ','), '"');
        assert_eq!(detect_escape_char(&["a \\\"b\\\" c"], '"'), '\\');
    }

    #[test]
    fn test_tokenizer_header_count_matches() {
        let tokens = tokenize_line(r#"ID, "Модель, цвет" ,"a ""b"""#, ',', '"', '"');
        assert_eq!(tokens, vec!["ID", "Модель, цвет", "a \"b\""]);

        let tokens = tokenize_line(r#""x \"y\"";z"#, ';', '"', '\\');
        assert_eq!(tokens, vec!["x \"y\"", "z"]);
    }

    #[test]
    fn test_windows_1251_fallback() {
        let (bytes, _, _) = WINDOWS_1251.encode("Модель;Бренд;Цена\nТелефон;Марка;100\n");
        let dialect = analyze(&bytes).unwrap();
        assert_ne!(dialect.encoding, "UTF-8");
        let (decoded, _) = dialect.encoding().decode_without_bom_handling(&bytes);
        assert!(!decoded.contains('\u{FFFD}'));
        assert_eq!(dialect.delimiter, ';');
        assert_eq!(dialect.headers.len(), 3);
    }

    #[test]
    fn test_duplicate_headers_are_suffixed() {
        let dialect = analyze(b"sku,price,price,price_2\nA1,1,2,3\n").unwrap();
        assert_eq!(dialect.headers, vec!["sku", "price", "price_3", "price_2"]);
        assert_eq!(dialect.warnings.len(), 1);
        assert!(dialect.warnings[0].contains("price_3"));
    }

    #[test]
    fn test_numeric_first_line_gets_synthetic_headers() {
        let dialect = analyze(b"1,2,3\n4,5,6\n").unwrap();
        assert!(!dialect.has_header);
        assert_eq!(dialect.headers, vec!["Колонка_1", "Колонка_2", "Колонка_3"]);
        assert!(!dialect.warnings.is_empty());
    }

    #[test]
    fn test_override_mismatch_adds_warning() {
        let settings = ImportSettings {
            delimiter: Some(';'),
            ..Default::default()
        };
        let dialect = DialectAnalyzer::default()
            .analyze(&mut Cursor::new(b"a,b\n1,2\n".to_vec()), &settings)
            .unwrap();
        assert_eq!(dialect.delimiter, ';');
        assert_eq!(dialect.warnings.len(), 1);
    }

    #[test]
    fn test_empty_file_is_rejected() {
        assert!(matches!(analyze(b""), Err(ImportError::EmptyFile(_))));
        assert!(matches!(analyze(b"\n  \n\r\n"), Err(ImportError::EmptyFile(_))));
    }

    #[test]
    fn test_estimate_lines() {
        // 每行 8 字节 + 2 → 100 / 10
        assert_eq!(estimate_lines(b"abcdefgh\nabcdefgh\n", 100, 50), 10);
        assert_eq!(estimate_lines(b"", 100, 50), 0);
    }
}
