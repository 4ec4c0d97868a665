//! 流式 CSV 读取
//!
//! 按块从对象存储拉取字节，拼出完整行后立即交给上游处理，
//! 任何时刻内存里只有未消费完的半行缓冲。字段切分支持双引号
//! 包裹与引号转义（""）。

use aws_sdk_s3::primitives::ByteStream;

use cashback_shared::error::{LedgerError, Result};

/// 流式按行读取器
pub struct CsvReader {
    stream: ByteStream,
    buf: Vec<u8>,
    eof: bool,
}

impl CsvReader {
    pub fn new(stream: ByteStream) -> Self {
        Self {
            stream,
            buf: Vec::new(),
            eof: false,
        }
    }

    /// 下一个完整行（不含行尾符），流结束返回 None
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }

            if self.eof {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                // 末行没有换行符
                let line = String::from_utf8_lossy(&self.buf).into_owned();
                self.buf.clear();
                return Ok(Some(line));
            }

            match self
                .stream
                .try_next()
                .await
                .map_err(|e| LedgerError::external("s3", format!("读取对象流失败: {e}")))?
            {
                Some(chunk) => self.buf.extend_from_slice(&chunk),
                None => self.eof = true,
            }
        }
    }
}

/// 切分一行 CSV 字段（引号感知），字段两端空白去除
pub fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(c),
        }
    }
    fields.push(current.trim().to_string());

    fields
}

/// 表头列位置
#[derive(Debug, Clone, Copy)]
pub struct ColumnMap {
    pub phone: usize,
    pub amount: usize,
    pub expiry: usize,
}

/// 从表头解析列位置
///
/// 运营上传的文件表头不统一，按别名（大小写不敏感）识别：
/// phone/mobile、amount/cashback/cashbackAmount、expiry/expiryDate/expiresOn。
pub fn resolve_columns(header: &[String]) -> Result<ColumnMap> {
    let mut phone = None;
    let mut amount = None;
    let mut expiry = None;

    for (idx, name) in header.iter().enumerate() {
        match name.to_ascii_lowercase().as_str() {
            "phone" | "mobile" => phone.get_or_insert(idx),
            "amount" | "cashback" | "cashbackamount" => amount.get_or_insert(idx),
            "expiry" | "expirydate" | "expireson" => expiry.get_or_insert(idx),
            _ => continue,
        };
    }

    match (phone, amount, expiry) {
        (Some(phone), Some(amount), Some(expiry)) => Ok(ColumnMap {
            phone,
            amount,
            expiry,
        }),
        _ => Err(LedgerError::Validation(format!(
            "表头缺少必要列（需要 phone/amount/expiry）: {header:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(data: &str) -> ByteStream {
        ByteStream::from(data.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_reads_lines_across_chunks() {
        let mut reader = CsvReader::new(stream("a,b,c\n1,2,3\n4,5,6\n"));

        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("a,b,c"));
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("1,2,3"));
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("4,5,6"));
        assert_eq!(reader.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_crlf_and_missing_trailing_newline() {
        let mut reader = CsvReader::new(stream("a,b\r\n1,2"));

        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("a,b"));
        // 末行没有换行符也要读出来
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("1,2"));
        assert_eq!(reader.next_line().await.unwrap(), None);
    }

    #[test]
    fn test_split_fields_quotes() {
        assert_eq!(split_fields("a, b ,c"), vec!["a", "b", "c"]);
        assert_eq!(split_fields(r#""a,b",c"#), vec!["a,b", "c"]);
        assert_eq!(split_fields(r#""say ""hi""",x"#), vec![r#"say "hi""#, "x"]);
        assert_eq!(split_fields(""), vec![""]);
    }

    #[test]
    fn test_resolve_columns_aliases() {
        let header: Vec<String> = ["Mobile", "cashbackAmount", "ExpiresOn"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let map = resolve_columns(&header).unwrap();
        assert_eq!(map.phone, 0);
        assert_eq!(map.amount, 1);
        assert_eq!(map.expiry, 2);
    }

    #[test]
    fn test_resolve_columns_missing() {
        let header: Vec<String> = ["phone", "amount"].iter().map(|s| s.to_string()).collect();
        assert!(resolve_columns(&header).is_err());
    }
}
