use crate::shell::command::Command;

/// 解析一行输入；参数个数不对或命令未知时返回提示信息
pub fn parse_command(input: &str) -> Result<Command, String> {
    let tokens: Vec<&str> = input.split_ascii_whitespace().collect();
    let Some((&cmd, args)) = tokens.split_first() else {
        return Err("empty command".to_string());
    };

    let one = |build: fn(String) -> Command| match args {
        [arg] => Ok(build(arg.to_string())),
        _ => Err(format!("{} requires one argument", cmd)),
    };
    let none = |command: Command| match args {
        [] => Ok(command),
        _ => Err(format!("{} takes no arguments", cmd)),
    };

    match cmd {
        "help" => none(Command::Help),
        "ls" => none(Command::Ls),
        "pwd" => none(Command::Pwd),
        "df" => none(Command::Df),
        "fsck" => none(Command::Fsck),
        "save" => none(Command::Save),
        "format" => none(Command::Format),
        "exit" => none(Command::Exit),
        "cd" => one(Command::Cd),
        "cat" => one(Command::Cat),
        "mkdir" => one(Command::Mkdir),
        "create" => one(Command::Create),
        "rm" => one(Command::Rm),
        "stat" => one(Command::Stat),
        "ln" => match args {
            [target, name] => Ok(Command::Ln(target.to_string(), name.to_string())),
            _ => Err("ln requires two arguments".to_string()),
        },
        "append" => match args {
            [name, text @ ..] if !text.is_empty() => {
                Ok(Command::Append(name.to_string(), text.join(" ")))
            }
            _ => Err("append requires a name and some text".to_string()),
        },
        "write" => match args {
            [name, offset, text @ ..] if !text.is_empty() => {
                let offset = offset
                    .parse::<usize>()
                    .map_err(|_| format!("write offset '{}' is not a number", offset))?;
                Ok(Command::Write(name.to_string(), offset, text.join(" ")))
            }
            _ => Err("write requires a name, an offset and some text".to_string()),
        },
        _ => Err(format!("command {} not valid", cmd)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arguments() {
        assert_eq!(parse_command("ls").unwrap(), Command::Ls);
        assert_eq!(parse_command("  cd  /a/b ").unwrap(), Command::Cd("/a/b".to_string()));
        assert_eq!(
            parse_command("ln target alias").unwrap(),
            Command::Ln("target".to_string(), "alias".to_string())
        );
        assert_eq!(
            parse_command("append hello big   world").unwrap(),
            Command::Append("hello".to_string(), "big world".to_string())
        );
        assert_eq!(
            parse_command("write notes 4 over here").unwrap(),
            Command::Write("notes".to_string(), 4, "over here".to_string())
        );
    }

    #[test]
    fn reports_arity_and_unknown_commands() {
        assert_eq!(parse_command("cd").unwrap_err(), "cd requires one argument");
        assert_eq!(parse_command("ln a").unwrap_err(), "ln requires two arguments");
        assert!(parse_command("append only").is_err());
        assert_eq!(
            parse_command("write notes x text").unwrap_err(),
            "write offset 'x' is not a number"
        );
        assert!(parse_command("write notes 3").is_err());
        assert!(parse_command("ls extra").is_err());
        assert_eq!(parse_command("frob").unwrap_err(), "command frob not valid");
        assert!(parse_command("   ").is_err());
    }
}
