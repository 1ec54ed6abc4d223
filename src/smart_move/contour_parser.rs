use nom::Finish;

use crate::meta_language::ContourCommand;

mod parser {
    use nom::branch::alt;
    use nom::bytes::complete::tag;
    use nom::character::complete::{char, multispace0};
    use nom::combinator::{all_consuming, map, value};
    use nom::multi::many0;
    use nom::number::complete::double;
    use nom::sequence::{delimited, preceded, separated_pair, terminated};
    use nom::IResult;

    use crate::meta_language::ContourCommand;

    type Input<'a> = &'a str;

    fn pair(input: Input) -> IResult<Input, (f64, f64)> {
        separated_pair(double, char(','), double)(input)
    }

    fn command(input: Input) -> IResult<Input, ContourCommand> {
        terminated(
            alt((
                value(ContourCommand::Initialize, tag("IN")),
                map(preceded(tag("PU"), pair), |(x, y)| ContourCommand::Jump { x, y }),
                map(preceded(tag("PD"), pair), |(x, y)| ContourCommand::Mark { x, y }),
                map(preceded(tag("PW"), double), |power| ContourCommand::LaserPower { power }),
                map(preceded(tag("VS"), double), |speed| ContourCommand::MarkSpeed { speed }),
            )),
            char(';'),
        )(input)
    }

    pub fn contour(input: Input) -> IResult<Input, Vec<ContourCommand>> {
        all_consuming(many0(delimited(multispace0, command, multispace0)))(input)
    }
}

/// Reads contour text as written by `SmartMoveInterpreter`
pub fn parse_contour(s: &str) -> Result<Vec<ContourCommand>, nom::error::Error<&str>> {
    match parser::contour(s).finish() {
        Ok((_, o)) => Ok(o),
        Err(e) => Err(e)
    }
}
